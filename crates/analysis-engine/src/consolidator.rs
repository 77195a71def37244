//! Merge per-chunk analyses into one report
//!
//! Findings are processed in chunk order. Two findings of the same category
//! from different chunks whose spans overlap by more than the dedup
//! threshold are the same clause seen twice through the chunk overlap; only
//! one survives. Scoring, recovery and top issues all run on the
//! deduplicated set.

use std::cmp::Ordering;

use chrono::Utc;
use sha2::{Digest, Sha256};
use shared_types::{
    Concern, ConsolidatedAnalysis, DocumentInfo, Finding, FindingCategory, Highlight,
    HighlightColor, RecoveryItem, RiskLevel, TopIssue, Usd,
};
use tracing::{debug, info, warn};

use crate::analyzer::ChunkAnalysis;
use crate::config::ConsolidationConfig;
use crate::error::ConsolidationError;

const ILLEGAL_WEIGHT: i64 = 20;
const RISKY_WEIGHT: i64 = 10;
const FAVORABLE_WEIGHT: i64 = 5;

const EXCERPT_CHARS: usize = 160;

/// Result of processing one chunk
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Analyzed { index: usize, analysis: ChunkAnalysis },
    /// Retrieval or analysis failed; the reason is for logs only
    Failed { index: usize, reason: String },
}

impl ChunkOutcome {
    pub fn index(&self) -> usize {
        match self {
            ChunkOutcome::Analyzed { index, .. } | ChunkOutcome::Failed { index, .. } => *index,
        }
    }
}

/// `clamp(20 * illegal + 10 * risky - 5 * favorable, 0, 100)` over scored findings
pub fn power_imbalance_score<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> u8 {
    let raw: i64 = findings
        .into_iter()
        .filter(|f| !f.advisory)
        .map(|f| match f.category {
            FindingCategory::Illegal => ILLEGAL_WEIGHT,
            FindingCategory::Risky => RISKY_WEIGHT,
            FindingCategory::Favorable => -FAVORABLE_WEIGHT,
        })
        .sum();
    raw.clamp(0, 100) as u8
}

/// Stable id derived from what the finding says and where
pub fn highlight_id(finding: &Finding) -> String {
    let mut hasher = Sha256::new();
    hasher.update(finding.category.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(finding.span.start.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(finding.span.end.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(finding.quote.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Whether `candidate` should replace `current` as the surviving duplicate
fn more_specific(candidate: &Finding, current: &Finding) -> bool {
    let confidence = |f: &Finding| f.confidence.unwrap_or(0.0);
    match confidence(candidate).total_cmp(&confidence(current)) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.citation.specificity() > current.citation.specificity(),
    }
}

fn excerpt(quote: &str) -> String {
    if quote.chars().count() <= EXCERPT_CHARS {
        return quote.to_string();
    }
    let cut: String = quote.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub struct Consolidator {
    config: ConsolidationConfig,
}

impl Consolidator {
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    /// Drop cross-chunk duplicates, keeping the more specific finding of each pair
    pub fn deduplicate(&self, mut findings: Vec<Finding>) -> Vec<Finding> {
        findings.sort_by_key(|f| (f.chunk_index, f.span.start, f.span.end));

        let mut kept: Vec<Finding> = Vec::with_capacity(findings.len());
        for finding in findings {
            let duplicate = kept.iter().position(|k| {
                k.category == finding.category
                    && k.chunk_index != finding.chunk_index
                    && k.span.overlap_ratio(&finding.span) > self.config.dedup_threshold
            });
            match duplicate {
                Some(pos) => {
                    debug!(
                        kept_chunk = kept[pos].chunk_index,
                        dropped_chunk = finding.chunk_index,
                        "Merged duplicate finding from chunk overlap"
                    );
                    if more_specific(&finding, &kept[pos]) {
                        kept[pos] = finding;
                    }
                }
                None => kept.push(finding),
            }
        }
        kept
    }

    /// Build the report for a document
    ///
    /// # Errors
    /// `AllChunksFailed` when no chunk produced an analysis. Zero outcomes
    /// also count as total failure.
    pub fn consolidate(
        &self,
        document_text: &str,
        mut outcomes: Vec<ChunkOutcome>,
    ) -> Result<ConsolidatedAnalysis, ConsolidationError> {
        outcomes.sort_by_key(ChunkOutcome::index);
        let total_chunks = outcomes.len();

        let mut findings = Vec::new();
        let mut concerns: Vec<Concern> = Vec::new();
        let mut degraded_chunks = Vec::new();
        for outcome in outcomes {
            match outcome {
                ChunkOutcome::Analyzed { analysis, .. } => {
                    findings.extend(analysis.findings);
                    for concern in analysis.concerns {
                        if !concerns.contains(&concern) {
                            concerns.push(concern);
                        }
                    }
                }
                ChunkOutcome::Failed { index, reason } => {
                    warn!(chunk = index, reason = %reason, "Chunk excluded from report");
                    degraded_chunks.push(index);
                }
            }
        }

        if degraded_chunks.len() == total_chunks {
            return Err(ConsolidationError::AllChunksFailed { total: total_chunks });
        }

        let findings = self.deduplicate(findings);
        let score = power_imbalance_score(&findings);
        let severity = RiskLevel::from_score(score);

        let highlights: Vec<Highlight> = findings
            .into_iter()
            .map(|finding| Highlight {
                id: highlight_id(&finding),
                color: HighlightColor::for_finding(&finding),
                finding,
                position: None,
            })
            .collect();

        let recovery_breakdown: Vec<RecoveryItem> = highlights
            .iter()
            .filter_map(|h| {
                let assessed = self.config.damages.assess(&h.finding)?;
                Some(RecoveryItem {
                    highlight_id: h.id.clone(),
                    statute: h.finding.citation.to_string(),
                    base_amount: assessed.base_amount,
                    multiplier: assessed.multiplier,
                    cap: assessed.cap,
                    amount: assessed.amount,
                    rationale: assessed.rationale,
                })
            })
            .collect();
        let potential_recovery: Usd = recovery_breakdown.iter().map(|r| r.amount).sum();

        let top_issues = self.top_issues(&highlights, &recovery_breakdown);
        let summary = self.summary(&highlights, score, &degraded_chunks, total_chunks);

        info!(
            findings = highlights.len(),
            score,
            severity = ?severity,
            recovery_cents = potential_recovery.cents(),
            degraded = degraded_chunks.len(),
            "Consolidated analysis"
        );

        Ok(ConsolidatedAnalysis {
            severity,
            power_imbalance_score: score,
            potential_recovery,
            recovery_breakdown,
            summary,
            top_issues,
            highlights,
            concerns,
            degraded_chunks,
            document_info: DocumentInfo {
                total_characters: document_text.chars().count(),
                total_chunks,
                analysis_date: Utc::now(),
            },
        })
    }

    fn top_issues(&self, highlights: &[Highlight], recovery: &[RecoveryItem]) -> Vec<TopIssue> {
        let recovered = |id: &str| recovery.iter().find(|r| r.highlight_id == id).map(|r| r.amount);

        let mut ranked: Vec<(&Highlight, Option<Usd>)> = highlights
            .iter()
            .filter(|h| h.finding.category != FindingCategory::Favorable && !h.finding.advisory)
            .map(|h| (h, recovered(&h.id)))
            .collect();

        ranked.sort_by(|(a, a_amount), (b, b_amount)| {
            b.finding
                .category
                .rank()
                .cmp(&a.finding.category.rank())
                .then(b.finding.damages_amount().cmp(&a.finding.damages_amount()))
                .then(b_amount.unwrap_or(Usd::ZERO).cmp(&a_amount.unwrap_or(Usd::ZERO)))
                .then(a.finding.chunk_index.cmp(&b.finding.chunk_index))
                .then(a.finding.span.start.cmp(&b.finding.span.start))
        });

        ranked
            .into_iter()
            .take(self.config.top_issues)
            .map(|(h, amount)| TopIssue {
                highlight_id: h.id.clone(),
                category: h.finding.category,
                statute: h.finding.citation.to_string(),
                excerpt: excerpt(&h.finding.quote),
                damages: amount,
            })
            .collect()
    }

    fn summary(&self, highlights: &[Highlight], score: u8, degraded: &[usize], total_chunks: usize) -> String {
        let count = |category: FindingCategory| {
            highlights
                .iter()
                .filter(|h| h.finding.category == category)
                .count()
        };

        let mut parts = Vec::new();
        let illegal = count(FindingCategory::Illegal);
        if illegal > 0 {
            parts.push(format!("Found {} illegal clause(s)", illegal));
        }
        let risky = count(FindingCategory::Risky);
        if risky > 0 {
            parts.push(format!("Identified {} risky term(s)", risky));
        }
        let favorable = count(FindingCategory::Favorable);
        if favorable > 0 {
            parts.push(format!("Found {} tenant-favorable provision(s)", favorable));
        }

        let verdict = if score > self.config.concerning_above {
            "Concerning"
        } else {
            "Acceptable"
        };
        parts.push(format!("Power Imbalance Score: {}/100 ({})", score, verdict));

        let advisory = highlights.iter().filter(|h| h.finding.advisory).count();
        if advisory > 0 {
            parts.push(format!(
                "{} advisory finding(s) made without statute context are not scored",
                advisory
            ));
        }
        if !degraded.is_empty() {
            parts.push(format!(
                "{} of {} chunk(s) could not be analyzed",
                degraded.len(),
                total_chunks
            ));
        }

        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::{ClauseSeverity, DamagesEstimate, StatuteCitation, TextSpan};

    fn finding(category: FindingCategory, chunk_index: usize, span: (usize, usize), damages: Option<u64>) -> Finding {
        Finding {
            category,
            quote: format!("clause {}-{}", span.0, span.1),
            citation: StatuteCitation::new("186", "15B"),
            explanation: "explanation".to_string(),
            damages: damages.map(|d| DamagesEstimate {
                amount: Usd::from_dollars(d),
                basis: "estimate".to_string(),
            }),
            chunk_index,
            span: TextSpan::new(span.0, span.1),
            severity: None,
            confidence: None,
            advisory: false,
        }
    }

    fn analyzed(index: usize, findings: Vec<Finding>) -> ChunkOutcome {
        ChunkOutcome::Analyzed {
            index,
            analysis: ChunkAnalysis {
                findings,
                concerns: Vec::new(),
            },
        }
    }

    fn consolidator() -> Consolidator {
        Consolidator::new(ConsolidationConfig::default())
    }

    #[test]
    fn test_score_weights_and_clamp() {
        let f = |c| finding(c, 0, (0, 10), None);
        assert_eq!(power_imbalance_score(&Vec::<Finding>::new()), 0);
        assert_eq!(
            power_imbalance_score(&[f(FindingCategory::Illegal), f(FindingCategory::Risky)]),
            30
        );
        assert_eq!(power_imbalance_score(&[f(FindingCategory::Favorable)]), 0);
        let many: Vec<Finding> = (0..6).map(|_| f(FindingCategory::Illegal)).collect();
        assert_eq!(power_imbalance_score(&many), 100);
    }

    #[test]
    fn test_advisory_findings_are_not_scored() {
        let mut advisory = finding(FindingCategory::Illegal, 0, (0, 10), Some(500));
        advisory.advisory = true;
        assert_eq!(power_imbalance_score(&[advisory.clone()]), 0);

        let report = consolidator()
            .consolidate("text", vec![analyzed(0, vec![advisory])])
            .unwrap();
        assert_eq!(report.potential_recovery, Usd::ZERO);
        assert_eq!(report.highlights.len(), 1);
        assert!(report.top_issues.is_empty());
        assert!(report.summary.contains("advisory"));
    }

    #[test]
    fn test_top_issues_rank_by_estimate_not_capped_recovery() {
        // 9,000 estimate capped to 5,000 under c. 186 s. 15B
        let capped = finding(FindingCategory::Illegal, 0, (10, 80), Some(9_000));
        // 3,000 estimate doubled to 6,000 under c. 93A
        let mut doubled = finding(FindingCategory::Illegal, 0, (200, 260), Some(3_000));
        doubled.citation = StatuteCitation::new("93A", "9");

        let report = consolidator()
            .consolidate("lease text", vec![analyzed(0, vec![doubled, capped])])
            .unwrap();

        let ranked: Vec<Option<Usd>> = report.top_issues.iter().map(|t| t.damages).collect();
        assert_eq!(
            ranked,
            vec![Some(Usd::from_dollars(5_000)), Some(Usd::from_dollars(6_000))]
        );
        assert_eq!(report.potential_recovery, Usd::from_dollars(11_000));
    }

    #[test]
    fn test_overlapping_findings_from_adjacent_chunks_merge() {
        let first = finding(FindingCategory::Illegal, 0, (900, 1000), Some(5_000));
        let mut second = finding(FindingCategory::Illegal, 1, (905, 1000), Some(5_000));
        second.citation = StatuteCitation::new("186", "15B(6)(e)");

        let kept = consolidator().deduplicate(vec![second.clone(), first]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].citation, second.citation);
    }

    #[test]
    fn test_dedup_keeps_earlier_on_ties() {
        let first = finding(FindingCategory::Risky, 0, (100, 200), None);
        let second = finding(FindingCategory::Risky, 1, (100, 200), None);
        let kept = consolidator().deduplicate(vec![first.clone(), second]);
        assert_eq!(kept, vec![first]);
    }

    #[test]
    fn test_dedup_prefers_confidence() {
        let mut first = finding(FindingCategory::Risky, 0, (100, 200), None);
        first.citation = StatuteCitation::new("186", "15B(1)(a)");
        first.confidence = Some(0.4);
        let mut second = finding(FindingCategory::Risky, 1, (110, 200), None);
        second.confidence = Some(0.9);
        let kept = consolidator().deduplicate(vec![first, second.clone()]);
        assert_eq!(kept, vec![second]);
    }

    #[test]
    fn test_dedup_needs_same_category_and_different_chunk() {
        let a = finding(FindingCategory::Risky, 0, (100, 200), None);
        let b = finding(FindingCategory::Illegal, 1, (100, 200), None);
        let c = finding(FindingCategory::Risky, 0, (100, 200), None);
        assert_eq!(consolidator().deduplicate(vec![a, b, c]).len(), 3);
    }

    #[test]
    fn test_all_failed_is_an_error() {
        let outcomes = vec![
            ChunkOutcome::Failed {
                index: 0,
                reason: "parse".into(),
            },
            ChunkOutcome::Failed {
                index: 1,
                reason: "model".into(),
            },
        ];
        assert_eq!(
            consolidator().consolidate("text", outcomes).unwrap_err(),
            ConsolidationError::AllChunksFailed { total: 2 }
        );
        assert!(consolidator().consolidate("", Vec::new()).is_err());
    }

    #[test]
    fn test_report_totals_and_ordering() {
        let mut risky = finding(FindingCategory::Risky, 1, (500, 560), Some(1_000));
        risky.citation = StatuteCitation::new("93A", "9");
        risky.severity = Some(ClauseSeverity::High);
        let illegal = finding(FindingCategory::Illegal, 0, (10, 80), Some(5_000));
        let favorable = finding(FindingCategory::Favorable, 1, (600, 640), None);

        let report = consolidator()
            .consolidate(
                "lease text",
                vec![
                    analyzed(1, vec![risky, favorable]),
                    ChunkOutcome::Failed {
                        index: 2,
                        reason: "timeout".into(),
                    },
                    analyzed(0, vec![illegal]),
                ],
            )
            .unwrap();

        assert_eq!(report.power_imbalance_score, 25);
        assert_eq!(report.severity, RiskLevel::Medium);
        assert_eq!(report.potential_recovery, Usd::from_dollars(7_000));
        assert_eq!(report.recovery_breakdown.len(), 2);
        assert_eq!(report.degraded_chunks, vec![2]);
        assert_eq!(report.document_info.total_chunks, 3);
        assert_eq!(report.document_info.total_characters, 10);

        let colors: Vec<HighlightColor> = report.highlights.iter().map(|h| h.color).collect();
        assert_eq!(colors, vec![HighlightColor::Red, HighlightColor::Orange, HighlightColor::Green]);

        assert_eq!(report.top_issues.len(), 2);
        assert_eq!(report.top_issues[0].category, FindingCategory::Illegal);
        assert_eq!(report.top_issues[1].damages, Some(Usd::from_dollars(2_000)));

        assert_eq!(
            report.summary,
            "Found 1 illegal clause(s) | Identified 1 risky term(s) | \
             Found 1 tenant-favorable provision(s) | Power Imbalance Score: 25/100 (Acceptable) | \
             1 of 3 chunk(s) could not be analyzed"
        );
    }

    #[test]
    fn test_highlight_ids_are_stable() {
        let f = finding(FindingCategory::Illegal, 0, (10, 80), None);
        assert_eq!(highlight_id(&f), highlight_id(&f.clone()));
        assert_eq!(highlight_id(&f).len(), 16);
        let moved = finding(FindingCategory::Illegal, 0, (11, 80), None);
        assert_ne!(highlight_id(&f), highlight_id(&moved));
    }

    #[test]
    fn test_concerns_are_deduplicated() {
        let concern = Concern {
            issue: "No move-in checklist".into(),
            recommendation: "Request one".into(),
        };
        let outcome = |index| ChunkOutcome::Analyzed {
            index,
            analysis: ChunkAnalysis {
                findings: Vec::new(),
                concerns: vec![concern.clone()],
            },
        };
        let report = consolidator().consolidate("text", vec![outcome(0), outcome(1)]).unwrap();
        assert_eq!(report.concerns, vec![concern]);
        assert_eq!(report.power_imbalance_score, 0);
        assert_eq!(report.severity, RiskLevel::Low);
    }

    #[test]
    fn test_long_quotes_are_truncated_in_top_issues() {
        let mut f = finding(FindingCategory::Risky, 0, (0, 400), None);
        f.quote = "x".repeat(400);
        let report = consolidator().consolidate("text", vec![analyzed(0, vec![f])]).unwrap();
        assert_eq!(report.top_issues[0].excerpt.chars().count(), EXCERPT_CHARS + 3);
        assert!(report.top_issues[0].excerpt.ends_with("..."));
    }
}
