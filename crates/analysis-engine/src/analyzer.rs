//! Per-chunk legal analysis
//!
//! The analyzer renders one prompt per chunk (chunk text, retrieved statutes,
//! response schema), calls the language model, and parses the answer against
//! a strict schema. A response that does not parse fails the chunk; it is
//! never read as "no findings".

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use shared_types::{
    ClauseSeverity, Concern, DamagesEstimate, Finding, FindingCategory, LawEntry, StatuteCitation,
    TextSpan, Usd,
};
use tracing::{debug, instrument, warn};

use crate::chunker::Chunk;
use crate::error::{AnalysisParseError, ChunkError, ModelError};

/// Capability: complete a prompt with free text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).generate(prompt).await
    }
}

const RESPONSE_SCHEMA: &str = r#"{
  "findings": [
    {
      "category": "illegal" | "risky" | "favorable",
      "quote": "exact text copied from the lease clause",
      "statute": { "chapter": "186", "section": "15B(6)(e)" },
      "explanation": "why the clause is illegal, risky or favorable",
      "severity": "low" | "medium" | "high" | "critical",
      "confidence": 0.0 to 1.0,
      "damages": { "amount_usd": 5000, "basis": "statutory remedy and how the amount follows" }
    }
  ],
  "concerns": [
    { "issue": "description of the concern", "recommendation": "what the tenant should do" }
  ]
}"#;

const NO_CONTEXT_NOTE: &str =
    "(No matching statute sections were retrieved. Rely on general Massachusetts landlord-tenant law.)";

/// Findings and concerns for one chunk, spans in document coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkAnalysis {
    pub findings: Vec<Finding>,
    pub concerns: Vec<Concern>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResponse {
    findings: Vec<RawFinding>,
    #[serde(default)]
    concerns: Vec<Concern>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFinding {
    category: FindingCategory,
    quote: String,
    statute: RawStatute,
    explanation: String,
    #[serde(default)]
    severity: Option<ClauseSeverity>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    damages: Option<RawDamages>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStatute {
    chapter: String,
    #[serde(default)]
    section: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDamages {
    amount_usd: f64,
    #[serde(default)]
    basis: String,
}

pub struct ChunkAnalyzer {
    model: Arc<dyn LanguageModel>,
}

impl ChunkAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Render the analysis prompt for one chunk
    pub fn build_prompt(chunk: &Chunk, total_chunks: usize, laws: &[LawEntry]) -> String {
        let context = if laws.is_empty() {
            NO_CONTEXT_NOTE.to_string()
        } else {
            laws.iter()
                .map(|law| format!("[Chapter {}, Section {}]\n{}", law.chapter, law.section, law.text.trim()))
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        };

        format!(
            "You are a legal expert specializing in Massachusetts tenant rights and housing law.\n\n\
             Analyze the following lease excerpt against Massachusetts General Laws \
             (Chapter 186 - Estates for Years and at Will, and Chapter 93A - Consumer Protection).\n\n\
             Personal details have been replaced with placeholders such as [NAME_REDACTED_1]. \
             Keep placeholders exactly as written when quoting.\n\n\
             LEASE EXCERPT (Chunk {index}/{total}):\n{text}\n\n\
             RELEVANT MASSACHUSETTS LAWS:\n{context}\n\n\
             Respond with a single JSON object of exactly this shape:\n{schema}\n\n\
             Rules:\n\
             - \"quote\" must be copied verbatim from the lease excerpt.\n\
             - Only illegal or risky findings may include \"damages\"; amounts are non-negative US dollars.\n\
             - Omit optional fields you cannot support. Do not add other fields.\n\
             - Use an empty \"findings\" array when the excerpt raises nothing.\n\n\
             Return ONLY valid JSON, no additional text.",
            index = chunk.index + 1,
            total = total_chunks,
            text = chunk.text,
            context = context,
            schema = RESPONSE_SCHEMA,
        )
    }

    /// Prompt the model for one chunk and parse its answer
    #[instrument(skip(self, chunk, laws), fields(chunk = chunk.index, laws = laws.len()))]
    pub async fn analyze(
        &self,
        chunk: &Chunk,
        total_chunks: usize,
        laws: &[LawEntry],
    ) -> Result<ChunkAnalysis, ChunkError> {
        let prompt = Self::build_prompt(chunk, total_chunks, laws);
        let raw = self.model.generate(&prompt).await?;
        let analysis = parse_response(&raw, chunk, laws.is_empty())?;
        debug!(
            findings = analysis.findings.len(),
            concerns = analysis.concerns.len(),
            "Chunk analyzed"
        );
        Ok(analysis)
    }
}

/// Body of the first fenced block, or the whole response when unfenced
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the info string ("json") up to the end of the fence line
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parse and validate a model response for `chunk`
///
/// Findings whose quote is not in the chunk are dropped with a warning, as is
/// a damages estimate attached to a favorable finding. Every other deviation
/// from the schema is an error.
pub fn parse_response(raw: &str, chunk: &Chunk, advisory: bool) -> Result<ChunkAnalysis, AnalysisParseError> {
    let response: RawResponse = serde_json::from_str(strip_code_fence(raw))?;

    let mut findings = Vec::with_capacity(response.findings.len());
    for (index, raw_finding) in response.findings.into_iter().enumerate() {
        if let Some(finding) = validate_finding(index, raw_finding, chunk, advisory)? {
            findings.push(finding);
        }
    }

    let concerns = response
        .concerns
        .into_iter()
        .filter(|c| !c.issue.trim().is_empty())
        .collect();

    Ok(ChunkAnalysis { findings, concerns })
}

fn validate_finding(
    index: usize,
    raw: RawFinding,
    chunk: &Chunk,
    advisory: bool,
) -> Result<Option<Finding>, AnalysisParseError> {
    let invalid = |reason: &str| AnalysisParseError::InvalidFinding {
        index,
        reason: reason.to_string(),
    };

    let quote = raw.quote.trim();
    if quote.is_empty() {
        return Err(invalid("quote is empty"));
    }
    if raw.statute.chapter.trim().is_empty() {
        return Err(invalid("statute chapter is empty"));
    }
    if let Some(confidence) = raw.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid("confidence must be between 0 and 1"));
        }
    }

    let damages = match raw.damages {
        Some(d) => {
            let amount = Usd::try_from_dollars_f64(d.amount_usd)
                .ok_or_else(|| invalid("damages amount must be a non-negative number"))?;
            Some(DamagesEstimate {
                amount,
                basis: d.basis.trim().to_string(),
            })
        }
        None => None,
    };
    let damages = if damages.is_some() && !raw.category.carries_damages() {
        warn!(chunk = chunk.index, finding = index, "Dropping damages on a favorable finding");
        None
    } else {
        damages
    };

    let Some(byte_offset) = chunk.text.find(quote) else {
        warn!(
            chunk = chunk.index,
            finding = index,
            category = %raw.category,
            "Quote not found verbatim in chunk, dropping finding"
        );
        return Ok(None);
    };
    let char_offset = chunk.text[..byte_offset].chars().count();
    let start = chunk.start + char_offset;

    Ok(Some(Finding {
        category: raw.category,
        quote: quote.to_string(),
        citation: StatuteCitation::new(&raw.statute.chapter, &raw.statute.section),
        explanation: raw.explanation.trim().to_string(),
        damages,
        chunk_index: chunk.index,
        span: TextSpan::new(start, start + quote.chars().count()),
        severity: raw.severity,
        confidence: raw.confidence,
        advisory,
    }))
}
