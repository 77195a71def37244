//! Law retrieval capability and bounded retry
//!
//! Retrieval sits behind an async trait so the engine can run against the
//! local keyword index, a remote vector service, or a test double. Transient
//! failures are retried here with exponential backoff; permanent failures and
//! exhausted retries are returned to the caller, which degrades the chunk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::LawEntry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    /// Timeouts, rate limits, unavailable backends
    #[error("transient retrieval failure: {0}")]
    Transient(String),

    /// Bad query, missing index, authentication
    #[error("retrieval failed: {0}")]
    Permanent(String),
}

impl RetrievalError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RetrievalError::Transient(_))
    }
}

/// Capability: fetch the `top_k` most relevant law sections for a query
#[async_trait]
pub trait LawRetriever: Send + Sync {
    /// Results are ordered by descending score. An empty result is not an error.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<LawEntry>, RetrievalError>;
}

#[async_trait]
impl<T: LawRetriever + ?Sized> LawRetriever for Arc<T> {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<LawEntry>, RetrievalError> {
        (**self).search(query, top_k).await
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Wraps a retriever and retries transient failures
pub struct RetryingRetriever<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: LawRetriever> RetryingRetriever<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: LawRetriever> LawRetriever for RetryingRetriever<R> {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<LawEntry>, RetrievalError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.search(query, top_k).await {
                Ok(entries) => {
                    debug!(attempt, results = entries.len(), "Law retrieval succeeded");
                    return Ok(entries);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient retrieval failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "Law retrieval gave up");
                    return Err(err);
                }
            }
        }
    }
}
