//! Encrypted storage for redaction mappings
//!
//! Mappings are serialized to JSON, sealed with AES-256-GCM under the
//! process key, and bound to their document id as associated data. Stores
//! only ever see `SealedBlob`s.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use shared_crypto::{MappingCipher, SealedBlob, SealingKey};
use shared_types::DocumentId;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::RedactionMapping;
use crate::error::RedactionError;

/// Persistence for sealed mappings, keyed by document id
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn put(&self, id: &DocumentId, blob: &SealedBlob) -> Result<(), RedactionError>;

    async fn get(&self, id: &DocumentId) -> Result<Option<SealedBlob>, RedactionError>;

    /// Returns whether anything was removed
    async fn remove(&self, id: &DocumentId) -> Result<bool, RedactionError>;
}

#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    blobs: RwLock<HashMap<DocumentId, SealedBlob>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn put(&self, id: &DocumentId, blob: &SealedBlob) -> Result<(), RedactionError> {
        self.blobs.write().await.insert(id.clone(), blob.clone());
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<SealedBlob>, RedactionError> {
        Ok(self.blobs.read().await.get(id).cloned())
    }

    async fn remove(&self, id: &DocumentId) -> Result<bool, RedactionError> {
        Ok(self.blobs.write().await.remove(id).is_some())
    }
}

/// One `<id>.enc` file per document under a directory
#[derive(Debug, Clone)]
pub struct FileMappingStore {
    dir: PathBuf,
}

impl FileMappingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &DocumentId) -> Result<PathBuf, RedactionError> {
        let raw = id.as_str();
        let safe = !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !safe {
            return Err(RedactionError::InvalidId(raw.to_string()));
        }
        Ok(self.dir.join(format!("{}.enc", raw)))
    }
}

#[async_trait]
impl MappingStore for FileMappingStore {
    async fn put(&self, id: &DocumentId, blob: &SealedBlob) -> Result<(), RedactionError> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash never leaves a truncated blob
        let tmp = path.with_extension("enc.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(blob)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "Wrote sealed mapping");
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<SealedBlob>, RedactionError> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &DocumentId) -> Result<bool, RedactionError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Seals mappings on the way into a [`MappingStore`] and opens them on the way out
#[derive(Clone)]
pub struct MappingVault {
    store: Arc<dyn MappingStore>,
    cipher: Arc<MappingCipher>,
}

impl MappingVault {
    pub fn new(store: Arc<dyn MappingStore>, key: &SealingKey) -> Self {
        info!(key = %key.fingerprint(), "Mapping vault ready");
        Self {
            store,
            cipher: Arc::new(MappingCipher::new(key)),
        }
    }

    pub async fn store(&self, id: &DocumentId, mapping: &RedactionMapping) -> Result<(), RedactionError> {
        let plaintext = serde_json::to_vec(mapping)?;
        let blob = self.cipher.seal(&plaintext, id.as_str().as_bytes())?;
        self.store.put(id, &blob).await?;
        debug!(document_id = %id, entries = mapping.len(), "Sealed redaction mapping");
        Ok(())
    }

    pub async fn load(&self, id: &DocumentId) -> Result<RedactionMapping, RedactionError> {
        let blob = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| RedactionError::MappingNotFound(id.clone()))?;
        let plaintext = self.cipher.open(&blob, id.as_str().as_bytes())?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    pub async fn erase(&self, id: &DocumentId) -> Result<bool, RedactionError> {
        let removed = self.store.remove(id).await?;
        debug!(document_id = %id, removed, "Erased redaction mapping");
        Ok(removed)
    }
}

impl std::fmt::Debug for MappingVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingVault").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redaction::Redactor;
    use pretty_assertions::assert_eq;
    use shared_crypto::CryptoError;

    const TEXT: &str = "Tenant: Jane Doe, SSN 123-45-6789, jane@example.com";

    fn key(secret: &str) -> SealingKey {
        SealingKey::derive(secret).unwrap()
    }

    #[tokio::test]
    async fn test_store_and_load_in_memory() {
        let vault = MappingVault::new(Arc::new(InMemoryMappingStore::new()), &key("secret"));
        let id = DocumentId::new();
        let outcome = Redactor::new().redact(TEXT);

        vault.store(&id, &outcome.mapping).await.unwrap();
        let loaded = vault.load(&id).await.unwrap();
        assert_eq!(loaded, outcome.mapping);
    }

    #[tokio::test]
    async fn test_missing_mapping() {
        let vault = MappingVault::new(Arc::new(InMemoryMappingStore::new()), &key("secret"));
        let err = vault.load(&DocumentId::from("absent")).await.unwrap_err();
        assert!(matches!(err, RedactionError::MappingNotFound(_)));
    }

    #[tokio::test]
    async fn test_wrong_key_cannot_open() {
        let store: Arc<dyn MappingStore> = Arc::new(InMemoryMappingStore::new());
        let id = DocumentId::new();
        let outcome = Redactor::new().redact(TEXT);

        MappingVault::new(store.clone(), &key("first"))
            .store(&id, &outcome.mapping)
            .await
            .unwrap();
        let err = MappingVault::new(store, &key("second")).load(&id).await.unwrap_err();
        assert!(matches!(err, RedactionError::Crypto(CryptoError::Authentication)));
    }

    #[tokio::test]
    async fn test_blob_moved_to_other_document_fails() {
        let store = Arc::new(InMemoryMappingStore::new());
        let vault = MappingVault::new(store.clone(), &key("secret"));
        let (a, b) = (DocumentId::new(), DocumentId::new());

        vault.store(&a, &Redactor::new().redact(TEXT).mapping).await.unwrap();
        let blob = store.get(&a).await.unwrap().unwrap();
        store.put(&b, &blob).await.unwrap();

        assert!(vault.load(&b).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_keeps_no_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileMappingStore::new(dir.path().join("mappings")));
        let vault = MappingVault::new(store.clone(), &key("secret"));
        let id = DocumentId::new();
        let outcome = Redactor::new().redact(TEXT);

        vault.store(&id, &outcome.mapping).await.unwrap();

        let path = store.dir().join(format!("{}.enc", id));
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("Jane Doe"));
        assert!(!on_disk.contains("123-45-6789"));
        assert!(!on_disk.contains("jane@example.com"));

        assert_eq!(vault.load(&id).await.unwrap(), outcome.mapping);
        assert!(vault.erase(&id).await.unwrap());
        assert!(!path.exists());
        assert!(!vault.erase(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMappingStore::new(dir.path());
        let err = store.get(&DocumentId::from("../escape")).await.unwrap_err();
        assert!(matches!(err, RedactionError::InvalidId(_)));
    }
}
