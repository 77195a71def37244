//! Document pipeline: ingest, analyze, cancel, delete
//!
//! `ingest` extracts and redacts a document and seals its mapping; from then
//! on only redacted text leaves this process. `analyze` runs the chunks of one
//! document sequentially and reports progress on the document record.
//! Different documents run concurrently on their own tasks via `spawn`.
//!
//! A run checks the record between chunks. Once the record is no longer
//! `Processing` (cancelled, or deleted) the run stops and nothing partial is
//! persisted. Completion is a single check-and-write under the store lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use corpus_core::{LawRetriever, RetryingRetriever};
use shared_crypto::SealingKey;
use shared_pdf::{CoordinateMapper, TextExtractor};
use shared_types::{ConsolidatedAnalysis, DocumentId, DocumentRecord, DocumentStatus, PageLayout};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::analyzer::{ChunkAnalyzer, LanguageModel};
use crate::chunker::{chunk, Chunk, ChunkParams};
use crate::config::EngineConfig;
use crate::consolidator::{ChunkOutcome, Consolidator};
use crate::documents::DocumentStore;
use crate::error::{ConfigError, PipelineError};
use crate::redaction::{reidentify, MappingStore, MappingVault, Redactor};

/// Per-document state held in memory only
struct DocumentContext {
    redacted_text: String,
    layouts: Vec<PageLayout>,
}

#[derive(Clone)]
pub struct AnalysisEngine {
    config: Arc<EngineConfig>,
    chunk_params: ChunkParams,
    documents: DocumentStore,
    contexts: Arc<RwLock<HashMap<DocumentId, Arc<DocumentContext>>>>,
    extractor: Arc<dyn TextExtractor>,
    retriever: Arc<RetryingRetriever<Arc<dyn LawRetriever>>>,
    analyzer: Arc<ChunkAnalyzer>,
    consolidator: Arc<Consolidator>,
    vault: MappingVault,
    redactor: Redactor,
}

impl AnalysisEngine {
    /// Wire the engine from validated configuration and its capabilities
    ///
    /// # Errors
    /// Returns `ConfigError` when the configuration is out of range. Nothing
    /// external has been called at that point.
    pub fn new(
        config: EngineConfig,
        key: &SealingKey,
        store: Arc<dyn MappingStore>,
        extractor: Arc<dyn TextExtractor>,
        retriever: Arc<dyn LawRetriever>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let chunk_params = config.chunking.params()?;

        Ok(Self {
            chunk_params,
            documents: DocumentStore::new(),
            contexts: Arc::new(RwLock::new(HashMap::new())),
            extractor,
            retriever: Arc::new(RetryingRetriever::new(retriever, config.retrieval.retry.clone())),
            analyzer: Arc::new(ChunkAnalyzer::new(model)),
            consolidator: Arc::new(Consolidator::new(config.consolidation.clone())),
            vault: MappingVault::new(store, key),
            redactor: Redactor::new(),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub async fn get(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.documents.get(id).await
    }

    /// Extract, redact and register a document
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<DocumentId, PipelineError> {
        let extracted = self.extractor.extract(bytes)?;
        let text = extracted.full_text();
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let outcome = self.redactor.redact(&text);
        let id = DocumentId::new();
        self.vault.store(&id, &outcome.mapping).await?;

        info!(
            document_id = %id,
            pages = extracted.pages.len(),
            redactions = outcome.total_redactions(),
            positioned = extracted.has_word_positions(),
            "Document ingested"
        );

        self.contexts.write().await.insert(
            id.clone(),
            Arc::new(DocumentContext {
                redacted_text: outcome.redacted,
                layouts: extracted.layouts(),
            }),
        );
        self.documents
            .insert(DocumentRecord::new(id.clone(), filename, bytes.len() as u64, outcome.counts))
            .await;

        Ok(id)
    }

    /// Run analysis on its own task
    pub fn spawn(&self, id: DocumentId) -> JoinHandle<Result<ConsolidatedAnalysis, PipelineError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.analyze(&id).await })
    }

    /// Analyze a previously ingested document
    ///
    /// Failures inside the run are recorded on the document (`failed`, with a
    /// message) and also returned. Unknown documents and illegal transitions
    /// are returned without touching any record.
    #[instrument(skip(self), fields(document_id = %id))]
    pub async fn analyze(&self, id: &DocumentId) -> Result<ConsolidatedAnalysis, PipelineError> {
        self.documents
            .update(id, |record| {
                record.transition(DocumentStatus::Processing)?;
                record.progress = 10;
                record.message = "Initializing analyzer...".to_string();
                Ok(())
            })
            .await?;

        match self.run(id).await {
            Ok(analysis) => Ok(analysis),
            Err(err) => {
                self.record_failure(id, &err).await;
                Err(err)
            }
        }
    }

    async fn run(&self, id: &DocumentId) -> Result<ConsolidatedAnalysis, PipelineError> {
        self.advance(id, 20, "Loading redacted text...").await?;
        let context = self
            .contexts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::ContextMissing(id.clone()))?;

        self.advance(id, 30, "Chunking document...").await?;
        let chunks = chunk(&context.redacted_text, &self.chunk_params);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        let total = chunks.len();
        self.advance(id, 40, &format!("Analyzing {} chunks against MA laws...", total))
            .await?;

        let mut outcomes = Vec::with_capacity(total);
        for (i, c) in chunks.iter().enumerate() {
            let progress = 40 + (i * 40 / total) as u8;
            self.advance(id, progress, &format!("Analyzing chunk {}/{}...", i + 1, total))
                .await?;
            outcomes.push(self.process_chunk(c, total).await);
        }

        self.advance(id, 85, "Consolidating findings...").await?;
        let mut analysis = self.consolidator.consolidate(&context.redacted_text, outcomes)?;

        self.advance(id, 95, "Locating highlights...").await?;
        self.attach_positions(id, &context, &mut analysis).await?;

        let report = analysis.clone();
        self.documents
            .update(id, move |record| {
                if record.status != DocumentStatus::Processing {
                    return Err(PipelineError::Cancelled(record.id.clone()));
                }
                record.transition(DocumentStatus::Completed)?;
                record.progress = 100;
                record.message = "Analysis complete".to_string();
                record.analysis = Some(report);
                record.analyzed_at = Some(Utc::now());
                Ok(())
            })
            .await?;

        info!(
            score = analysis.power_imbalance_score,
            highlights = analysis.highlights.len(),
            "Analysis complete"
        );
        Ok(analysis)
    }

    /// Retrieve and analyze one chunk. Failures degrade the chunk only.
    #[instrument(skip(self, chunk), fields(chunk = chunk.index))]
    async fn process_chunk(&self, chunk: &Chunk, total: usize) -> ChunkOutcome {
        let laws = match self.retriever.search(&chunk.text, self.config.retrieval.top_k).await {
            Ok(laws) => laws,
            Err(err) => {
                warn!(error = %err, "Law retrieval failed for chunk");
                return ChunkOutcome::Failed {
                    index: chunk.index,
                    reason: err.to_string(),
                };
            }
        };
        if laws.is_empty() {
            debug!("No statutes retrieved; findings will be advisory");
        }

        match self.analyzer.analyze(chunk, total, &laws).await {
            Ok(analysis) => ChunkOutcome::Analyzed {
                index: chunk.index,
                analysis,
            },
            Err(err) => {
                warn!(error = %err, "Chunk analysis failed");
                ChunkOutcome::Failed {
                    index: chunk.index,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Place highlights on the page layout. Quotes are re-identified in
    /// memory for matching only; the report keeps the redacted quote.
    async fn attach_positions(
        &self,
        id: &DocumentId,
        context: &DocumentContext,
        analysis: &mut ConsolidatedAnalysis,
    ) -> Result<(), PipelineError> {
        let mapping = self.vault.load(id).await?;
        let mapper = CoordinateMapper::new(context.layouts.clone());

        let mut located = 0;
        for highlight in &mut analysis.highlights {
            let quote = reidentify(&highlight.finding.quote, &mapping);
            highlight.position = mapper.locate(&quote);
            if highlight.position.is_some() {
                located += 1;
            }
        }

        debug!(located, total = analysis.highlights.len(), "Highlight positions resolved");
        Ok(())
    }

    /// Update progress, failing with `Cancelled` once the run was stopped
    async fn advance(&self, id: &DocumentId, progress: u8, message: &str) -> Result<(), PipelineError> {
        self.documents
            .update(id, |record| {
                if record.status != DocumentStatus::Processing {
                    return Err(PipelineError::Cancelled(record.id.clone()));
                }
                record.progress = progress;
                record.message = message.to_string();
                Ok(())
            })
            .await
    }

    async fn record_failure(&self, id: &DocumentId, err: &PipelineError) {
        if err.is_request_error() {
            info!(document_id = %id, reason = %err, "Analysis stopped");
            return;
        }

        error!(document_id = %id, error = %err, "Analysis failed");
        let message = format!("Analysis failed: {}", err);
        let result = self
            .documents
            .update(id, |record| {
                if record.status == DocumentStatus::Processing {
                    record.transition(DocumentStatus::Failed)?;
                    record.progress = 0;
                    record.message = message.clone();
                    record.error = Some(err.to_string());
                }
                Ok(())
            })
            .await;
        if let Err(update_err) = result {
            warn!(document_id = %id, error = %update_err, "Could not record analysis failure");
        }
    }

    /// Stop a running analysis. The run notices at its next checkpoint.
    pub async fn cancel(&self, id: &DocumentId) -> Result<(), PipelineError> {
        self.documents
            .update(id, |record| {
                record.transition(DocumentStatus::Failed)?;
                record.message = "Analysis cancelled".to_string();
                record.error = Some("cancelled by request".to_string());
                Ok(())
            })
            .await?;
        info!(document_id = %id, "Analysis cancelled");
        Ok(())
    }

    /// Remove the record, the in-memory context and the sealed mapping
    pub async fn delete(&self, id: &DocumentId) -> Result<(), PipelineError> {
        self.documents
            .remove(id)
            .await
            .ok_or_else(|| PipelineError::DocumentNotFound(id.clone()))?;
        self.contexts.write().await.remove(id);
        let erased = self.vault.erase(id).await?;
        info!(document_id = %id, mapping_erased = erased, "Document deleted");
        Ok(())
    }
}
