//! Shared cryptography utilities
//!
//! Symmetric sealing of small payloads (redaction mappings) under a key
//! derived from process configuration.

pub mod cipher;

pub use cipher::{CryptoError, MappingCipher, SealedBlob, SealingKey};
