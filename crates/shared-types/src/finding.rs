//! Clause-level findings produced by chunk analysis

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::money::Usd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingCategory {
    Illegal,
    Risky,
    Favorable,
}

impl FindingCategory {
    /// Ordering weight used when ranking issues (higher is worse for the tenant)
    pub fn rank(&self) -> u8 {
        match self {
            FindingCategory::Illegal => 2,
            FindingCategory::Risky => 1,
            FindingCategory::Favorable => 0,
        }
    }

    /// Only illegal and risky findings may carry a damages estimate
    pub fn carries_damages(&self) -> bool {
        !matches!(self, FindingCategory::Favorable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::Illegal => "illegal",
            FindingCategory::Risky => "risky",
            FindingCategory::Favorable => "favorable",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity the model attached to a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClauseSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Chapter + section reference, e.g. chapter "186", section "15B(2)(a)"
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatuteCitation {
    pub chapter: String,
    pub section: String,
}

impl StatuteCitation {
    pub fn new(chapter: &str, section: &str) -> Self {
        Self {
            chapter: chapter.trim().to_string(),
            section: section.trim().to_string(),
        }
    }

    /// Ordering key for "more specific" citations: a section beats none, more
    /// subsection components beat fewer, longer references break ties.
    pub fn specificity(&self) -> (bool, usize, usize) {
        let section = self.section.trim();
        let components = section.matches('(').count();
        (!section.is_empty(), components, section.len() + self.chapter.trim().len())
    }
}

impl fmt::Display for StatuteCitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.section.is_empty() {
            write!(f, "Chapter {}", self.chapter)
        } else {
            write!(f, "Chapter {}, Section {}", self.chapter, self.section)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamagesEstimate {
    pub amount: Usd,
    /// How the model arrived at the amount
    pub basis: String,
}

/// Half-open character range `[start, end)` in the redacted document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlap(&self, other: &TextSpan) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    /// Overlap measured against the shorter of the two spans
    pub fn overlap_ratio(&self, other: &TextSpan) -> f64 {
        let shorter = self.len().min(other.len());
        if shorter == 0 {
            return 0.0;
        }
        self.overlap(other) as f64 / shorter as f64
    }
}

/// One detected clause-level issue or benefit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: FindingCategory,
    /// Verbatim text from the (redacted) chunk
    pub quote: String,
    pub citation: StatuteCitation,
    pub explanation: String,
    pub damages: Option<DamagesEstimate>,
    pub chunk_index: usize,
    pub span: TextSpan,
    pub severity: Option<ClauseSeverity>,
    pub confidence: Option<f32>,
    /// Produced without any retrieved law context; reported but not scored
    #[serde(default)]
    pub advisory: bool,
}

impl Finding {
    pub fn damages_amount(&self) -> Usd {
        self.damages.as_ref().map(|d| d.amount).unwrap_or(Usd::ZERO)
    }
}
