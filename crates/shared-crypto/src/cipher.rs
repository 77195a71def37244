//! AES-256-GCM sealing for redaction mappings
//!
//! The key is derived from a process-wide secret with SHA-256 under a fixed
//! domain prefix. Every sealed blob carries its own random 96-bit nonce, and
//! the caller supplies a context (the document id) that is authenticated as
//! associated data, so a blob copied under another document id fails to open.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_DOMAIN: &[u8] = b"lease-analysis/pii-mapping/v1";

/// Current sealed payload format
pub const SEALED_VERSION: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key material is missing (set {0})")]
    MissingKey(String),

    #[error("sealed payload is malformed: {0}")]
    Malformed(String),

    #[error("unsupported sealed payload version {0}")]
    UnsupportedVersion(u8),

    #[error("decryption failed: wrong key, wrong document, or tampered payload")]
    Authentication,

    #[error("encryption failed")]
    Encryption,
}

/// 256-bit key derived from configuration. Never printed.
#[derive(Clone)]
pub struct SealingKey([u8; 32]);

impl SealingKey {
    /// Derive a key from secret material
    ///
    /// # Errors
    /// Returns `CryptoError::MissingKey` when the secret is empty or blank.
    pub fn derive(secret: &str) -> Result<Self, CryptoError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CryptoError::MissingKey("a non-empty secret".to_string()));
        }

        let mut hasher = Sha256::new();
        hasher.update(KEY_DOMAIN);
        hasher.update(secret.as_bytes());
        Ok(Self(hasher.finalize().into()))
    }

    /// Derive a key from the named environment variable
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        let secret = std::env::var(var).map_err(|_| CryptoError::MissingKey(var.to_string()))?;
        Self::derive(&secret).map_err(|_| CryptoError::MissingKey(var.to_string()))
    }

    /// Short, non-reversible identifier for logs
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealingKey({})", self.fingerprint())
    }
}

/// Encrypted payload as stored at rest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    pub version: u8,
    pub nonce_b64: String,
    pub ciphertext_b64: String,
    pub sealed_at: DateTime<Utc>,
}

pub struct MappingCipher {
    cipher: Aes256Gcm,
}

impl MappingCipher {
    pub fn new(key: &SealingKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.0);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt `plaintext`, binding it to `context`
    ///
    /// # Arguments
    /// * `plaintext` - Serialized mapping
    /// * `context` - Associated data (document id); required again to open
    pub fn seal(&self, plaintext: &[u8], context: &[u8]) -> Result<SealedBlob, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: context,
                },
            )
            .map_err(|_| CryptoError::Encryption)?;

        Ok(SealedBlob {
            version: SEALED_VERSION,
            nonce_b64: BASE64.encode(nonce_bytes),
            ciphertext_b64: BASE64.encode(ciphertext),
            sealed_at: Utc::now(),
        })
    }

    /// Decrypt a blob sealed under the same key and context
    pub fn open(&self, blob: &SealedBlob, context: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.version != SEALED_VERSION {
            return Err(CryptoError::UnsupportedVersion(blob.version));
        }

        let nonce_raw = BASE64
            .decode(blob.nonce_b64.as_bytes())
            .map_err(|e| CryptoError::Malformed(format!("nonce: {}", e)))?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(CryptoError::Malformed(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce_raw.len()
            )));
        }
        let ciphertext = BASE64
            .decode(blob.ciphertext_b64.as_bytes())
            .map_err(|e| CryptoError::Malformed(format!("ciphertext: {}", e)))?;

        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce_raw),
                Payload {
                    msg: &ciphertext,
                    aad: context,
                },
            )
            .map_err(|_| CryptoError::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cipher(secret: &str) -> MappingCipher {
        MappingCipher::new(&SealingKey::derive(secret).unwrap())
    }

    #[test]
    fn test_seal_open_round_trip() {
        let c = cipher("process-secret");
        let blob = c.seal(b"{\"[NAME_REDACTED_1]\":\"Jane Doe\"}", b"doc-1").unwrap();
        let opened = c.open(&blob, b"doc-1").unwrap();
        assert_eq!(opened, b"{\"[NAME_REDACTED_1]\":\"Jane Doe\"}".to_vec());
    }

    #[test]
    fn test_ciphertext_does_not_contain_plaintext() {
        let c = cipher("process-secret");
        let blob = c.seal(b"Jane Doe", b"doc-1").unwrap();
        let json = serde_json::to_string(&blob).unwrap();
        assert!(!json.contains("Jane Doe"));
    }

    #[test]
    fn test_open_rejects_other_document_context() {
        let c = cipher("process-secret");
        let blob = c.seal(b"Jane Doe", b"doc-1").unwrap();
        assert_eq!(c.open(&blob, b"doc-2"), Err(CryptoError::Authentication));
    }

    #[test]
    fn test_open_rejects_other_key() {
        let blob = cipher("first").seal(b"Jane Doe", b"doc-1").unwrap();
        assert_eq!(cipher("second").open(&blob, b"doc-1"), Err(CryptoError::Authentication));
    }

    #[test]
    fn test_blank_secret_is_missing_key() {
        assert!(matches!(SealingKey::derive("   "), Err(CryptoError::MissingKey(_))));
    }

    #[test]
    fn test_missing_env_var_is_missing_key() {
        let err = SealingKey::from_env("LEASE_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert_eq!(err, CryptoError::MissingKey("LEASE_TEST_KEY_THAT_IS_NEVER_SET".to_string()));
    }

    #[test]
    fn test_nonces_differ_between_seals() {
        let c = cipher("process-secret");
        let a = c.seal(b"same", b"doc").unwrap();
        let b = c.seal(b"same", b"doc").unwrap();
        assert_ne!(a.nonce_b64, b.nonce_b64);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = SealingKey::derive("process-secret").unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.starts_with("SealingKey("));
        assert!(!debug.contains("process-secret"));
    }
}
