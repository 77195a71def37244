//! Search module - keyword (BM25) retrieval over the law corpus

pub mod keyword;

pub use keyword::KeywordLawIndex;

/// BM25 scores are unbounded; this constant sets where a raw score maps to 0.5
pub const SCORE_HALF_POINT: f32 = 5.0;

/// Map a raw BM25 score onto `[0, 1)`
pub fn normalize_score(raw: f32) -> f32 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0.0;
    }
    raw / (raw + SCORE_HALF_POINT)
}
