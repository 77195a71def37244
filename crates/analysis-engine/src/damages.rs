//! Statutory damages table
//!
//! Rules are configuration data. The first rule whose matchers all accept a
//! finding decides its multiplier, cap and fallback amount. Findings that
//! match no rule keep their estimate unchanged; illegal findings without an
//! estimate fall back to the table-wide default.

use serde::{Deserialize, Serialize};
use shared_types::{Finding, FindingCategory, Usd};

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamagesRule {
    /// Shown in the recovery rationale
    pub name: String,
    /// Exact chapter, compared case-insensitively
    #[serde(default)]
    pub chapter: Option<String>,
    /// Section must start with this, compared case-insensitively
    #[serde(default)]
    pub section_prefix: Option<String>,
    /// Any of these must appear in the explanation, quote or damages basis
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub cap_usd: Option<u64>,
    /// Used for illegal findings the model gave no estimate for
    #[serde(default)]
    pub fallback_usd: Option<u64>,
}

impl DamagesRule {
    pub fn matches(&self, finding: &Finding) -> bool {
        let citation = &finding.citation;

        if let Some(chapter) = &self.chapter {
            if !citation.chapter.trim().eq_ignore_ascii_case(chapter.trim()) {
                return false;
            }
        }

        if let Some(prefix) = &self.section_prefix {
            let section = citation.section.trim().to_ascii_lowercase();
            if !section.starts_with(&prefix.trim().to_ascii_lowercase()) {
                return false;
            }
        }

        if !self.keywords.is_empty() {
            let mut haystack = format!("{} {}", finding.explanation, finding.quote);
            if let Some(damages) = &finding.damages {
                haystack.push(' ');
                haystack.push_str(&damages.basis);
            }
            let haystack = haystack.to_lowercase();
            if !self
                .keywords
                .iter()
                .any(|k| haystack.contains(&k.to_lowercase()))
            {
                return false;
            }
        }

        true
    }
}

/// Outcome of applying the table to one finding
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub base_amount: Usd,
    pub multiplier: f64,
    pub cap: Option<Usd>,
    pub amount: Usd,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamagesTable {
    #[serde(default)]
    pub rules: Vec<DamagesRule>,
    /// Fallback for illegal findings when no rule supplies one
    #[serde(default)]
    pub default_fallback_usd: Option<u64>,
}

impl Default for DamagesTable {
    fn default() -> Self {
        Self {
            rules: vec![
                DamagesRule {
                    name: "Security deposit (c. 186 s. 15B)".to_string(),
                    chapter: Some("186".to_string()),
                    section_prefix: Some("15B".to_string()),
                    keywords: Vec::new(),
                    multiplier: 1.0,
                    cap_usd: Some(5_000),
                    fallback_usd: Some(5_000),
                },
                DamagesRule {
                    name: "Consumer protection (c. 93A)".to_string(),
                    chapter: Some("93A".to_string()),
                    section_prefix: None,
                    keywords: Vec::new(),
                    multiplier: 2.0,
                    cap_usd: None,
                    fallback_usd: Some(2_500),
                },
                DamagesRule {
                    name: "Security deposit handling".to_string(),
                    chapter: None,
                    section_prefix: None,
                    keywords: vec!["security deposit".to_string()],
                    multiplier: 1.0,
                    cap_usd: Some(5_000),
                    fallback_usd: Some(5_000),
                },
            ],
            default_fallback_usd: Some(1_000),
        }
    }
}

impl DamagesTable {
    pub fn rule_for(&self, finding: &Finding) -> Option<&DamagesRule> {
        self.rules.iter().find(|rule| rule.matches(finding))
    }

    /// Assess a finding. `None` for favorable findings, advisory findings and
    /// risky findings without an estimate.
    pub fn assess(&self, finding: &Finding) -> Option<Assessment> {
        if !finding.category.carries_damages() || finding.advisory {
            return None;
        }

        let rule = self.rule_for(finding);
        let (base_amount, mut rationale) = match &finding.damages {
            Some(estimate) => (estimate.amount, estimate.basis.trim().to_string()),
            None if finding.category == FindingCategory::Illegal => {
                let fallback = rule
                    .and_then(|r| r.fallback_usd)
                    .or(self.default_fallback_usd)?;
                (
                    Usd::from_dollars(fallback),
                    "Estimated from violation type".to_string(),
                )
            }
            None => return None,
        };
        if rationale.is_empty() {
            rationale = "Model estimate".to_string();
        }

        let multiplier = rule.map(|r| r.multiplier).unwrap_or(1.0);
        let cap = rule.and_then(|r| r.cap_usd).map(Usd::from_dollars);

        let mut amount = base_amount.scale(multiplier);
        if let Some(cap) = cap {
            amount = amount.min(cap);
        }

        if let Some(rule) = rule {
            rationale.push_str(&format!("; {}: x{}", rule.name, multiplier));
            if let Some(cap) = cap {
                rationale.push_str(&format!(", capped at {}", cap));
            }
        }

        Some(Assessment {
            base_amount,
            multiplier,
            cap,
            amount,
            rationale,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        for rule in &self.rules {
            if !rule.multiplier.is_finite() || rule.multiplier < 0.0 {
                return Err(format!("damages rule '{}' has an invalid multiplier", rule.name));
            }
        }
        Ok(())
    }
}
