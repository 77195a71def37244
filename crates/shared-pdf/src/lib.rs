//! Shared PDF handling utilities
//!
//! Text and layout extraction, coordinate conversion between the extractor's
//! top-left space and PDF user space, and quote location for highlights.

pub mod coords;
pub mod extract;
pub mod locate;

pub use coords::{box_to_rect, layout_to_pdf, MediaBox};
pub use extract::{
    ExtractError, ExtractedDocument, LayoutJsonExtractor, PageText, PdfTextExtractor, TextExtractor,
};
pub use locate::{locate, CoordinateMapper};
