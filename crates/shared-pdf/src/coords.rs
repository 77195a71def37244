//! Coordinate transformation between layout space and PDF space
//!
//! Layout extractors report word boxes with a top-left origin. PDF user space
//! (and PDF.js highlight rectangles) use a bottom-left origin.

use shared_types::Rect;

/// Page media box in PDF user space: origin plus size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl MediaBox {
    /// Media box at the origin, the common case for extractor output
    pub fn of_size(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Convert layout coordinates (top-left origin) to PDF coordinates (bottom-left origin)
///
/// `layout_width`/`layout_height` describe the space the extractor measured
/// in; when it already reports points these equal the media box size.
pub fn layout_to_pdf(
    x: f64,
    y: f64,
    layout_width: f64,
    layout_height: f64,
    media_box: MediaBox,
) -> (f64, f64) {
    let x_pct = x / layout_width;
    let y_pct = y / layout_height;

    let pdf_x = media_box.x + x_pct * media_box.width;
    let pdf_y = media_box.y + (media_box.height - y_pct * media_box.height);

    (pdf_x, pdf_y)
}

/// Convert a top-left box (`x0..x1`, `top..bottom`) on a page of the given
/// size into a bottom-left `Rect`. `None` for degenerate boxes.
pub fn box_to_rect(
    page_number: u32,
    x0: f64,
    x1: f64,
    top: f64,
    bottom: f64,
    page_width: f64,
    page_height: f64,
) -> Option<Rect> {
    let media_box = MediaBox::of_size(page_width, page_height);
    if !media_box.is_usable() {
        return None;
    }

    let (left, upper) = layout_to_pdf(x0, top, page_width, page_height, media_box);
    let (right, lower) = layout_to_pdf(x1, bottom, page_width, page_height, media_box);
    Rect::from_edges(page_number, left, lower, right, upper)
}
