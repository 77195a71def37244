//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! Secrets never come from the file: the mapping key is read from
//! `LEASE_PII_KEY` at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use corpus_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use shared_crypto::SealingKey;

use crate::chunker::ChunkParams;
use crate::damages::DamagesTable;
use crate::error::ConfigError;
use crate::redaction::{FileMappingStore, InMemoryMappingStore, MappingStore};

/// Environment variable holding the redaction-mapping key material
pub const PII_KEY_ENV: &str = "LEASE_PII_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub consolidation: ConsolidationConfig,
    pub redaction: RedactionConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - A value is out of range (see [`EngineConfig::validate`])
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// ```
    /// use analysis_engine::EngineConfig;
    ///
    /// let config = EngineConfig::from_str(r#"
    ///     [chunking]
    ///     max_tokens = 2000
    ///     overlap_tokens = 100
    /// "#).unwrap();
    /// assert_eq!(config.retrieval.top_k, 8);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.params()?;

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be at least 1".into()));
        }
        let threshold = self.consolidation.dedup_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "consolidation.dedup_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        self.consolidation
            .damages
            .validate()
            .map_err(ConfigError::Invalid)?;

        Ok(())
    }

    /// Derive the mapping key from the environment
    pub fn sealing_key() -> Result<SealingKey, ConfigError> {
        SealingKey::from_env(PII_KEY_ENV).map_err(|_| ConfigError::MissingKey(PII_KEY_ENV.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    /// How far before the hard cut a paragraph or sentence break may be used
    pub slack_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            overlap_tokens: 200,
            slack_tokens: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams, ConfigError> {
        ChunkParams::new(self.max_tokens, self.overlap_tokens, self.slack_tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub retry: RetryPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Minimum span overlap (against the shorter span) for two findings to merge
    pub dedup_threshold: f64,
    pub top_issues: usize,
    /// Scores above this are summarized as concerning
    pub concerning_above: u8,
    pub damages: DamagesTable,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.8,
            top_issues: 5,
            concerning_above: 50,
            damages: DamagesTable::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Directory for sealed mappings; in-memory when unset
    pub mapping_dir: Option<PathBuf>,
}

impl RedactionConfig {
    pub fn open_store(&self) -> Arc<dyn MappingStore> {
        match &self.mapping_dir {
            Some(dir) => Arc::new(FileMappingStore::new(dir.clone())),
            None => Arc::new(InMemoryMappingStore::new()),
        }
    }
}
