//! Text extraction
//!
//! Two sources are supported: layout JSON produced by an external
//! layout-aware extractor (words with boxes, used for highlighting), and raw
//! PDF bytes via `pdf-extract` (text only, so highlights cannot be placed).

use shared_types::PageLayout;
use thiserror::Error;
use tracing::{debug, warn};

/// Separator placed between page texts in the full document text
pub const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid layout JSON: {0}")]
    InvalidLayout(#[from] serde_json::Error),

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("document contains no extractable text")]
    Empty,
}

/// Text of one page together with its word layout
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub text: String,
    pub layout: PageLayout,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedDocument {
    pub pages: Vec<PageText>,
}

impl ExtractedDocument {
    /// Page texts joined by a blank line
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    pub fn layouts(&self) -> Vec<PageLayout> {
        self.pages.iter().map(|p| p.layout.clone()).collect()
    }

    /// True when at least one page carries positioned words
    pub fn has_word_positions(&self) -> bool {
        self.pages.iter().any(|p| !p.layout.words.is_empty())
    }
}

/// Capability: turn uploaded bytes into per-page text and layout
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError>;
}

/// Reads a JSON array of `PageLayout` objects
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutJsonExtractor;

impl TextExtractor for LayoutJsonExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
        let mut layouts: Vec<PageLayout> = serde_json::from_slice(bytes)?;
        layouts.sort_by_key(|l| l.page_number);

        let pages: Vec<PageText> = layouts
            .into_iter()
            .map(|layout| PageText {
                text: layout.text(),
                layout,
            })
            .collect();

        if pages.iter().all(|p| p.text.trim().is_empty()) {
            return Err(ExtractError::Empty);
        }

        debug!(pages = pages.len(), "Extracted layout JSON");
        Ok(ExtractedDocument { pages })
    }
}

/// Plain-text extraction from PDF bytes
///
/// `pdf-extract` does not expose word positions, so the whole document comes
/// back as a single page with an empty layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }

        warn!("PDF extracted without word positions; highlights will have no coordinates");
        Ok(ExtractedDocument {
            pages: vec![PageText {
                text,
                layout: PageLayout {
                    page_number: 1,
                    width: 0.0,
                    height: 0.0,
                    words: Vec::new(),
                },
            }],
        })
    }
}
