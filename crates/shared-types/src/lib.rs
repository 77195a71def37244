//! Shared domain types for the lease analysis workspace
//!
//! Everything that crosses a crate boundary lives here: document records and
//! their lifecycle, law-corpus entries, findings, highlights, page layouts and
//! the consolidated report.

pub mod finding;
pub mod layout;
pub mod money;
pub mod report;
pub mod types;

pub use finding::{
    ClauseSeverity, DamagesEstimate, Finding, FindingCategory, StatuteCitation, TextSpan,
};
pub use layout::{LayoutWord, PageLayout};
pub use money::Usd;
pub use report::{
    Concern, ConsolidatedAnalysis, DocumentInfo, Highlight, HighlightColor, HighlightPosition,
    Rect, RecoveryItem, RiskLevel, TopIssue,
};
pub use types::{
    DocumentId, DocumentRecord, DocumentStatus, LawEntry, PiiCategory, RedactionCounts,
    TransitionError,
};
