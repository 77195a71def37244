//! Page layouts as produced by a layout-aware text extractor
//!
//! Word boxes use the extractor's native top-left origin (`top < bottom`);
//! conversion to PDF space happens in `shared-pdf`.

use serde::{Deserialize, Serialize};

/// Words whose `top` values differ by less than this are on the same line
pub const LINE_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutWord {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
}

impl LayoutWord {
    /// Finite, non-empty box with positive width and height
    pub fn is_well_formed(&self) -> bool {
        [self.x0, self.x1, self.top, self.bottom]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 > self.x0
            && self.bottom > self.top
            && !self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// 1-based
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub words: Vec<LayoutWord>,
}

impl PageLayout {
    /// Reconstruct page text: words joined by spaces, a newline between
    /// visual lines.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut last_top: Option<f64> = None;

        for word in &self.words {
            match last_top {
                Some(top) if (word.top - top).abs() < LINE_TOLERANCE => out.push(' '),
                Some(_) => out.push('\n'),
                None => {}
            }
            out.push_str(word.text.trim());
            last_top = Some(word.top);
        }

        out
    }
}
