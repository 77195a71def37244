//! Analysis Engine - PII-safe lease analysis
//!
//! This crate provides:
//! - Redaction of personal data with an encrypted, reversible mapping
//! - Overlapping token-budgeted chunking
//! - Per-chunk statute retrieval and language-model analysis
//! - Consolidation into a scored report with highlights and recovery estimates
//! - The document pipeline tying these together

pub mod analyzer;
pub mod chunker;
pub mod config;
pub mod consolidator;
pub mod damages;
pub mod documents;
pub mod error;
pub mod pipeline;
pub mod redaction;

pub use analyzer::{parse_response, ChunkAnalysis, ChunkAnalyzer, LanguageModel};
pub use chunker::{chunk, estimate_tokens, reassemble, Chunk, ChunkParams};
pub use config::{
    ChunkingConfig, ConsolidationConfig, EngineConfig, RedactionConfig, RetrievalConfig, PII_KEY_ENV,
};
pub use consolidator::{highlight_id, power_imbalance_score, ChunkOutcome, Consolidator};
pub use damages::{Assessment, DamagesRule, DamagesTable};
pub use documents::DocumentStore;
pub use error::{
    AnalysisParseError, ChunkError, ConfigError, ConsolidationError, ModelError, PipelineError,
    RedactionError,
};
pub use pipeline::AnalysisEngine;
pub use redaction::{
    reidentify, FileMappingStore, InMemoryMappingStore, MappingEntry, MappingStore, MappingVault,
    RedactionMapping, RedactionOutcome, Redactor,
};
