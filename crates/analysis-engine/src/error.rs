//! Error taxonomy for the analysis engine
//!
//! Configuration errors are fatal and surface before any external call.
//! Chunk-level errors (retrieval, model, parse) degrade a single chunk; the
//! document fails only when every chunk does.

use corpus_core::RetrievalError;
use shared_crypto::CryptoError;
use shared_pdf::ExtractError;
use shared_types::{DocumentId, TransitionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("encryption key material is missing: {0}")]
    MissingKey(String),
}

/// The model answered, but not in the required shape
#[derive(Debug, Error)]
pub enum AnalysisParseError {
    #[error("response does not match the findings schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("finding {index} is invalid: {reason}")]
    InvalidFinding { index: usize, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("language model unavailable: {0}")]
    Unavailable(String),

    #[error("language model rejected the request: {0}")]
    Rejected(String),
}

/// Why a single chunk produced no analysis
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Parse(#[from] AnalysisParseError),
}

#[derive(Debug, Error)]
pub enum RedactionError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("failed to serialize redaction mapping: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("mapping store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("document id {0:?} cannot be used as a storage key")]
    InvalidId(String),

    #[error("no redaction mapping stored for document {0}")]
    MappingNotFound(DocumentId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsolidationError {
    #[error("all {total} chunk(s) failed analysis; refusing to report a clean lease")]
    AllChunksFailed { total: usize },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Redaction(#[from] RedactionError),

    #[error("redacted text for document {0} is not loaded in this process")]
    ContextMissing(DocumentId),

    #[error("document has no text to analyze")]
    EmptyDocument,

    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),

    #[error("analysis of document {0} was cancelled")]
    Cancelled(DocumentId),
}

impl PipelineError {
    /// Errors about the caller's request rather than the document's content.
    /// These propagate without touching the document record.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            PipelineError::DocumentNotFound(_) | PipelineError::Transition(_) | PipelineError::Cancelled(_)
        )
    }
}
