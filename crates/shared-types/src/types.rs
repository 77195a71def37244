use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::ConsolidatedAnalysis;

/// Opaque document identifier (UUID v4 string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a document record
///
/// `Uploaded → Processing → Completed | Failed`. A failed document may be
/// retried (`Failed → Processing`); `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing) | (Processing, Completed) | (Processing, Failed) | (Failed, Processing)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

/// Categories of personally identifying information the redactor handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    PersonName,
    Organization,
    Address,
    Ssn,
    Email,
    Phone,
    CreditCard,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 7] = [
        PiiCategory::PersonName,
        PiiCategory::Organization,
        PiiCategory::Address,
        PiiCategory::Ssn,
        PiiCategory::Email,
        PiiCategory::Phone,
        PiiCategory::CreditCard,
    ];

    /// Label used inside placeholder tokens, e.g. `[NAME_REDACTED_1]`
    pub fn token_label(&self) -> &'static str {
        match self {
            PiiCategory::PersonName => "NAME",
            PiiCategory::Organization => "ORGANIZATION",
            PiiCategory::Address => "ADDRESS",
            PiiCategory::Ssn => "SSN",
            PiiCategory::Email => "EMAIL",
            PiiCategory::Phone => "PHONE",
            PiiCategory::CreditCard => "CARD",
        }
    }

    pub fn from_token_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token_label() == label)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiCategory::PersonName => "person_name",
            PiiCategory::Organization => "organization",
            PiiCategory::Address => "address",
            PiiCategory::Ssn => "ssn",
            PiiCategory::Email => "email",
            PiiCategory::Phone => "phone",
            PiiCategory::CreditCard => "credit_card",
        }
    }
}

/// Number of redacted occurrences per category
pub type RedactionCounts = BTreeMap<PiiCategory, usize>;

/// A statute excerpt returned by the law-corpus retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawEntry {
    pub chapter: String,
    pub section: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    /// Relevance to the query chunk, in [0, 1]
    pub score: f32,
}

/// Persisted per-document record, polled by the outer surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
    /// 0-100
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    /// Counts only; the mapping itself lives in the encrypted mapping store
    /// under the same document id.
    pub redaction: RedactionCounts,
    pub analysis: Option<ConsolidatedAnalysis>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn new(id: DocumentId, filename: &str, size_bytes: u64, redaction: RedactionCounts) -> Self {
        Self {
            id,
            filename: filename.to_string(),
            size_bytes,
            uploaded_at: Utc::now(),
            status: DocumentStatus::Uploaded,
            progress: 0,
            message: "Document uploaded and PII redacted".to_string(),
            error: None,
            redaction,
            analysis: None,
            analyzed_at: None,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: DocumentStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == DocumentStatus::Processing {
            self.error = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use DocumentStatus::*;
        assert!(Uploaded.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));

        assert!(!Uploaded.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn test_record_rejects_invalid_transition() {
        let mut record = DocumentRecord::new(DocumentId::from("doc-1"), "lease.pdf", 10, RedactionCounts::new());
        assert!(record.transition(DocumentStatus::Completed).is_err());
        assert_eq!(record.status, DocumentStatus::Uploaded);

        record.transition(DocumentStatus::Processing).unwrap();
        record.transition(DocumentStatus::Completed).unwrap();
        let err = record.transition(DocumentStatus::Failed).unwrap_err();
        assert_eq!(err.from, DocumentStatus::Completed);
    }

    #[test]
    fn test_token_labels_round_trip() {
        for category in PiiCategory::ALL {
            assert_eq!(PiiCategory::from_token_label(category.token_label()), Some(category));
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
