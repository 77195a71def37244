//! Overlapping, token-budgeted chunking
//!
//! Token counts are estimated as `ceil(chars / 4)`. This is approximate but
//! deterministic, which is what retries need. All offsets are in `char`s,
//! not bytes, so chunk boundaries never split a code point.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Validated chunking parameters, in tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_tokens: usize,
    overlap_tokens: usize,
    slack_tokens: usize,
}

impl ChunkParams {
    pub fn new(max_tokens: usize, overlap_tokens: usize, slack_tokens: usize) -> Result<Self, ConfigError> {
        if max_tokens == 0 {
            return Err(ConfigError::InvalidChunking("max_tokens must be at least 1".into()));
        }
        if overlap_tokens >= max_tokens {
            return Err(ConfigError::InvalidChunking(format!(
                "overlap_tokens ({}) must be smaller than max_tokens ({})",
                overlap_tokens, max_tokens
            )));
        }
        if max_tokens.checked_mul(CHARS_PER_TOKEN).is_none() {
            return Err(ConfigError::InvalidChunking(format!(
                "max_tokens ({}) is too large",
                max_tokens
            )));
        }
        Ok(Self {
            max_tokens,
            overlap_tokens,
            slack_tokens,
        })
    }

    fn window_chars(&self) -> usize {
        self.max_tokens * CHARS_PER_TOKEN
    }

    fn overlap_chars(&self) -> usize {
        self.overlap_tokens * CHARS_PER_TOKEN
    }

    /// Slack is clamped so every chunk ends strictly past the next overlap start
    fn slack_chars(&self) -> usize {
        let limit = self.window_chars() - self.overlap_chars() - 1;
        self.slack_tokens.saturating_mul(CHARS_PER_TOKEN).min(limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position in the document
    pub index: usize,
    pub text: String,
    pub estimated_tokens: usize,
    /// Char offset of the first character in the source text
    pub start: usize,
    /// Char offset one past the last character
    pub end: usize,
}

/// Find the best cut in `(floor, hard_end]`: latest paragraph break, else latest
/// sentence end or line break. Positions are "cut before `chars[pos]`".
fn find_boundary(chars: &[char], floor: usize, hard_end: usize) -> Option<usize> {
    let candidates = (floor + 1..=hard_end).rev();

    let paragraph = candidates
        .clone()
        .find(|&pos| pos >= 2 && chars[pos - 1] == '\n' && chars[pos - 2] == '\n');
    if paragraph.is_some() {
        return paragraph;
    }

    candidates.into_iter().find(|&pos| {
        let prev = chars[pos - 1];
        if prev == '\n' {
            return true;
        }
        matches!(prev, '.' | '!' | '?') && chars.get(pos).is_some_and(|c| c.is_whitespace())
    })
}

/// Split `text` into overlapping chunks
///
/// Each chunk after the first starts exactly `overlap_tokens * 4` characters
/// before the previous chunk's end. Empty input yields no chunks; input that
/// fits in one window yields exactly one.
pub fn chunk(text: &str, params: &ChunkParams) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }

    let window = params.window_chars();
    let overlap = params.overlap_chars();
    let slack = params.slack_chars();

    let mut chunks = Vec::new();
    let mut start: usize = 0;

    loop {
        let hard_end = start.saturating_add(window);
        let end = if hard_end >= total {
            total
        } else {
            let floor = (hard_end - slack).max(start + overlap);
            find_boundary(&chars, floor, hard_end).unwrap_or(hard_end)
        };

        let chunk_text: String = chars[start..end].iter().collect();
        chunks.push(Chunk {
            index: chunks.len(),
            estimated_tokens: estimate_tokens(&chunk_text),
            text: chunk_text,
            start,
            end,
        });

        if end == total {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Rebuild the source text, dropping each chunk's overlap with its predecessor
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered: usize = 0;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        out.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.end);
    }

    out
}
