//! Locate quoted text in page layouts
//!
//! Quotes come from a language model and rarely match the extracted words
//! byte for byte: whitespace, case, curly quotes and trailing punctuation all
//! drift. Matching is therefore done word by word on normalized text. The
//! first and last quote words may be fragments of a layout word (the model
//! started or stopped mid-word), and any placeholder token still present in
//! the quote stands for one to eight layout words.
//!
//! A quote that cannot be found yields `None`; callers keep the finding
//! without a position.

use lazy_static::lazy_static;
use regex::Regex;
use shared_types::layout::LINE_TOLERANCE;
use shared_types::{HighlightPosition, LayoutWord, PageLayout, Rect};
use tracing::debug;

use crate::coords::box_to_rect;

/// Most layout words a single placeholder may stand for
const MAX_PLACEHOLDER_WORDS: usize = 8;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"^\[[A-Z_]+_REDACTED_\d+\]$").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
enum QuoteToken {
    Word(String),
    Placeholder,
}

/// Lowercase, fold typographic quotes and dashes, strip edge punctuation
fn normalize_word(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            _ => c,
        })
        .flat_map(char::to_lowercase)
        .collect();

    folded
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

fn tokenize_quote(quote: &str) -> Vec<QuoteToken> {
    quote
        .split_whitespace()
        .filter_map(|raw| {
            let trimmed = raw.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | '.' | ';' | ':'));
            if PLACEHOLDER.is_match(trimmed) {
                return Some(QuoteToken::Placeholder);
            }
            let word = normalize_word(raw);
            (!word.is_empty()).then_some(QuoteToken::Word(word))
        })
        .collect()
}

fn word_matches(token: &str, candidate: &str, is_first: bool, is_last: bool) -> bool {
    if token == candidate {
        return true;
    }
    (is_first && candidate.ends_with(token)) || (is_last && candidate.starts_with(token))
}

/// Try to match `tokens` starting at `words[pos]`; returns the exclusive end
/// index of the matched run.
fn match_from(tokens: &[QuoteToken], words: &[String], qi: usize, pos: usize) -> Option<usize> {
    if qi == tokens.len() {
        return Some(pos);
    }
    if pos >= words.len() {
        return None;
    }

    let is_first = qi == 0;
    let is_last = qi + 1 == tokens.len();

    match &tokens[qi] {
        QuoteToken::Word(token) => {
            if word_matches(token, &words[pos], is_first, is_last) {
                match_from(tokens, words, qi + 1, pos + 1)
            } else {
                None
            }
        }
        QuoteToken::Placeholder => {
            let longest = MAX_PLACEHOLDER_WORDS.min(words.len() - pos);
            (1..=longest).find_map(|span| match_from(tokens, words, qi + 1, pos + span))
        }
    }
}

/// Group matched words into visual lines and build one rectangle per line
fn line_rects(page: &PageLayout, matched: &[&LayoutWord]) -> Vec<Rect> {
    let mut rects = Vec::new();
    let mut line: Vec<&LayoutWord> = Vec::new();

    let flush = |line: &mut Vec<&LayoutWord>, rects: &mut Vec<Rect>| {
        if line.is_empty() {
            return;
        }
        let x0 = line.iter().map(|w| w.x0).fold(f64::INFINITY, f64::min);
        let x1 = line.iter().map(|w| w.x1).fold(f64::NEG_INFINITY, f64::max);
        let top = line.iter().map(|w| w.top).fold(f64::INFINITY, f64::min);
        let bottom = line.iter().map(|w| w.bottom).fold(f64::NEG_INFINITY, f64::max);
        if let Some(rect) = box_to_rect(page.page_number, x0, x1, top, bottom, page.width, page.height) {
            rects.push(rect);
        }
        line.clear();
    };

    for word in matched {
        let new_line = line
            .first()
            .is_some_and(|first| (word.top - first.top).abs() >= LINE_TOLERANCE);
        if new_line {
            flush(&mut line, &mut rects);
        }
        line.push(word);
    }
    flush(&mut line, &mut rects);

    rects
}

fn locate_on_page(tokens: &[QuoteToken], page: &PageLayout) -> Option<HighlightPosition> {
    let usable: Vec<(&LayoutWord, String)> = page
        .words
        .iter()
        .filter(|w| w.is_well_formed())
        .map(|w| (w, normalize_word(&w.text)))
        .filter(|(_, n)| !n.is_empty())
        .collect();

    if usable.is_empty() {
        return None;
    }

    let normalized: Vec<String> = usable.iter().map(|(_, n)| n.clone()).collect();

    for start in 0..normalized.len() {
        let Some(end) = match_from(tokens, &normalized, 0, start) else {
            continue;
        };

        let matched: Vec<&LayoutWord> = usable[start..end].iter().map(|(w, _)| *w).collect();
        let rects = line_rects(page, &matched);
        // Boxes too thin to survive rounding leave no rectangle; try the next occurrence
        let Some(first) = rects.first() else {
            continue;
        };
        let Some(bounding_rect) = rects.iter().skip(1).try_fold(*first, |acc, r| acc.union(r)) else {
            continue;
        };

        return Some(HighlightPosition {
            page_number: page.page_number,
            bounding_rect,
            rects,
            page_width: page.width,
            page_height: page.height,
        });
    }

    None
}

/// Find the first occurrence of `quote` across `pages`, in page order
pub fn locate(quote: &str, pages: &[PageLayout]) -> Option<HighlightPosition> {
    let tokens = tokenize_quote(quote);
    if !tokens.iter().any(|t| matches!(t, QuoteToken::Word(_))) {
        return None;
    }

    let found = pages.iter().find_map(|page| locate_on_page(&tokens, page));
    if found.is_none() {
        debug!(quote_words = tokens.len(), pages = pages.len(), "Quote not located in layout");
    }
    found
}

/// Per-document locator over the original (unredacted) page layouts
#[derive(Debug, Clone, Default)]
pub struct CoordinateMapper {
    pages: Vec<PageLayout>,
}

impl CoordinateMapper {
    pub fn new(pages: Vec<PageLayout>) -> Self {
        Self { pages }
    }

    pub fn locate(&self, quote: &str) -> Option<HighlightPosition> {
        locate(quote, &self.pages)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
