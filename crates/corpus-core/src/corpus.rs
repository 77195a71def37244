use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read law corpus {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("law corpus is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("law entry {index} has an empty {field}")]
    EmptyField { index: usize, field: &'static str },

    #[error("failed to build law index: {0}")]
    Index(#[from] tantivy::TantivyError),
}

/// One statute section as stored in the corpus file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawRecord {
    pub chapter: String,
    pub section: String,
    #[serde(default, alias = "section_title")]
    pub title: Option<String>,
    pub text: String,
}

/// Immutable, validated set of law sections
#[derive(Debug, Clone, Default)]
pub struct LawCorpus {
    records: Vec<LawRecord>,
}

impl LawCorpus {
    /// Validate and wrap records. Chapter and text must be non-blank.
    pub fn new(records: Vec<LawRecord>) -> Result<Self, CorpusError> {
        for (index, record) in records.iter().enumerate() {
            if record.chapter.trim().is_empty() {
                return Err(CorpusError::EmptyField { index, field: "chapter" });
            }
            if record.text.trim().is_empty() {
                return Err(CorpusError::EmptyField { index, field: "text" });
            }
        }
        Ok(Self { records })
    }

    /// Parse a JSON array of `{chapter, section, title?, text}` objects
    pub fn from_json(json: &str) -> Result<Self, CorpusError> {
        let records: Vec<LawRecord> = serde_json::from_str(json)?;
        Self::new(records)
    }

    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let json = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let corpus = Self::from_json(&json)?;
        info!(path = %path.display(), sections = corpus.len(), "Loaded law corpus");
        Ok(corpus)
    }

    pub fn records(&self) -> &[LawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
