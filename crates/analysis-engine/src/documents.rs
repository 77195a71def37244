//! Shared arena of document records
//!
//! Every running analysis and every status poll goes through this store.
//! Updates take the write lock for the duration of one closure, so a
//! check-then-write on a record is atomic.

use std::collections::HashMap;
use std::sync::Arc;

use shared_types::{DocumentId, DocumentRecord};
use tokio::sync::RwLock;

use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    records: Arc<RwLock<HashMap<DocumentId, DocumentRecord>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: DocumentRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// Snapshot of a record
    pub async fn get(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Apply `f` to the record under the write lock
    pub async fn update<T>(
        &self,
        id: &DocumentId,
        f: impl FnOnce(&mut DocumentRecord) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| PipelineError::DocumentNotFound(id.clone()))?;
        f(record)
    }

    pub async fn remove(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.records.write().await.remove(id)
    }

    /// All records, oldest upload first
    pub async fn list(&self) -> Vec<DocumentRecord> {
        let mut all: Vec<DocumentRecord> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        all
    }
}
