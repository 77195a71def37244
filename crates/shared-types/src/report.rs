//! Consolidated analysis report and highlight geometry
//!
//! Geometry uses the PDF convention: origin at the bottom-left of the page,
//! y increasing upward, units in points. Field names serialize in camelCase so
//! the payload can be handed to a PDF.js highlighter unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::finding::{ClauseSeverity, Finding, FindingCategory};
use crate::money::Usd;

/// Axis-aligned rectangle, bottom-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub x1: f64,
    /// Bottom edge
    pub y1: f64,
    pub x2: f64,
    /// Top edge
    pub y2: f64,
    pub width: f64,
    pub height: f64,
    pub page_number: u32,
}

impl Rect {
    /// Build from edges; `None` unless `right > left` and `top > bottom`
    pub fn from_edges(page_number: u32, left: f64, bottom: f64, right: f64, top: f64) -> Option<Self> {
        let finite = [left, bottom, right, top].iter().all(|v| v.is_finite());
        if !finite || right <= left || top <= bottom {
            return None;
        }
        Some(Self {
            x1: round2(left),
            y1: round2(bottom),
            x2: round2(right),
            y2: round2(top),
            width: round2(right - left),
            height: round2(top - bottom),
            page_number,
        })
        .filter(Rect::is_valid)
    }

    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Option<Rect> {
        Rect::from_edges(
            self.page_number,
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightPosition {
    pub page_number: u32,
    pub bounding_rect: Rect,
    /// One rectangle per visual line the match crosses
    pub rects: Vec<Rect>,
    pub page_width: f64,
    pub page_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Red,
    Orange,
    Yellow,
    Green,
}

impl HighlightColor {
    pub fn for_finding(finding: &Finding) -> Self {
        match finding.category {
            FindingCategory::Illegal => HighlightColor::Red,
            FindingCategory::Risky => match finding.severity {
                Some(ClauseSeverity::High) | Some(ClauseSeverity::Critical) => HighlightColor::Orange,
                _ => HighlightColor::Yellow,
            },
            FindingCategory::Favorable => HighlightColor::Green,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    /// Stable across re-runs over the same redacted text
    pub id: String,
    pub finding: Finding,
    pub color: HighlightColor,
    /// `None` when the quote could not be located in the page layout
    pub position: Option<HighlightPosition>,
}

/// Overall lease severity derived from the power-imbalance score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=20 => RiskLevel::Low,
            21..=40 => RiskLevel::Medium,
            41..=60 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

/// One contribution to the potential-recovery total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryItem {
    pub highlight_id: String,
    pub statute: String,
    pub base_amount: Usd,
    pub multiplier: f64,
    pub cap: Option<Usd>,
    pub amount: Usd,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopIssue {
    pub highlight_id: String,
    pub category: FindingCategory,
    pub statute: String,
    pub excerpt: String,
    pub damages: Option<Usd>,
}

/// Free-form concern the model raised alongside its findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concern {
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub total_characters: usize,
    pub total_chunks: usize,
    pub analysis_date: DateTime<Utc>,
}

/// Terminal analysis payload of a completed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedAnalysis {
    pub severity: RiskLevel,
    /// 0-100
    pub power_imbalance_score: u8,
    pub potential_recovery: Usd,
    pub recovery_breakdown: Vec<RecoveryItem>,
    pub summary: String,
    pub top_issues: Vec<TopIssue>,
    pub highlights: Vec<Highlight>,
    pub concerns: Vec<Concern>,
    /// Chunks whose retrieval or analysis failed
    pub degraded_chunks: Vec<usize>,
    pub document_info: DocumentInfo,
}
