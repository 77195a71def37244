//! Corpus Core - statutory law corpus and retrieval
//!
//! This crate provides:
//! - The `LawRetriever` capability used by chunk analysis
//! - A bounded retry wrapper for transient retrieval failures
//! - A local BM25 keyword index over a JSON law corpus (Tantivy)

pub mod corpus;
pub mod retriever;
pub mod search;

pub use corpus::{CorpusError, LawCorpus, LawRecord};
pub use retriever::{LawRetriever, RetrievalError, RetryPolicy, RetryingRetriever};
pub use search::KeywordLawIndex;
