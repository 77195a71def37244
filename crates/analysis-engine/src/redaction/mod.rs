//! PII redaction and re-identification
//!
//! `Redactor::redact` replaces every detected PII span with a typed
//! placeholder such as `[NAME_REDACTED_1]`. Numbering is per category and
//! starts at 1 on every call; the same original value always gets the same
//! token. A token that already appears literally in the input is skipped so
//! that `reidentify` restores the input exactly.
//!
//! The mapping is the only place raw PII survives. It is sealed by
//! [`vault::MappingVault`] before it is stored.

pub mod patterns;
pub mod vault;

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use shared_types::{PiiCategory, RedactionCounts};
use tracing::debug;

use patterns::{detect, find_whole_word, resolve_overlaps, Detection};

pub use vault::{FileMappingStore, InMemoryMappingStore, MappingStore, MappingVault};

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\[[A-Z_]+_REDACTED_\d+\]").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub category: PiiCategory,
    pub value: String,
}

/// Placeholder token → original value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedactionMapping {
    entries: BTreeMap<String, MappingEntry>,
}

impl RedactionMapping {
    pub fn get(&self, token: &str) -> Option<&MappingEntry> {
        self.entries.get(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, token: String, category: PiiCategory, value: String) {
        self.entries.insert(token, MappingEntry { category, value });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionOutcome {
    pub redacted: String,
    pub mapping: RedactionMapping,
    /// Occurrences replaced, per category
    pub counts: RedactionCounts,
}

impl RedactionOutcome {
    pub fn total_redactions(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    pub fn redact(&self, text: &str) -> RedactionOutcome {
        let mut detections = detect(text);

        // Names and organizations found once are redacted everywhere
        let mut named: Vec<(PiiCategory, String)> = Vec::new();
        for d in resolve_overlaps(detections.clone()) {
            if matches!(d.category, PiiCategory::PersonName | PiiCategory::Organization) {
                let value = text[d.start..d.end].to_string();
                if !named.iter().any(|(_, v)| *v == value) {
                    named.push((d.category, value));
                }
            }
        }
        for (category, value) in &named {
            for (start, end) in find_whole_word(text, value) {
                detections.push(Detection {
                    start,
                    end,
                    category: *category,
                });
            }
        }

        let resolved = resolve_overlaps(detections);

        let mut redacted = String::with_capacity(text.len());
        let mut mapping = RedactionMapping::default();
        let mut counts = RedactionCounts::new();
        let mut assigned: HashMap<(PiiCategory, &str), String> = HashMap::new();
        let mut next_n: HashMap<PiiCategory, usize> = HashMap::new();
        let mut cursor = 0;

        for d in &resolved {
            let value = &text[d.start..d.end];
            let token = assigned
                .entry((d.category, value))
                .or_insert_with(|| {
                    let n = next_n.entry(d.category).or_insert(1);
                    let token = loop {
                        let candidate = format!("[{}_REDACTED_{}]", d.category.token_label(), n);
                        *n += 1;
                        if !text.contains(&candidate) {
                            break candidate;
                        }
                    };
                    mapping.insert(token.clone(), d.category, value.to_string());
                    token
                })
                .clone();

            redacted.push_str(&text[cursor..d.start]);
            redacted.push_str(&token);
            cursor = d.end;
            *counts.entry(d.category).or_insert(0) += 1;
        }
        redacted.push_str(&text[cursor..]);

        debug!(
            redactions = resolved.len(),
            distinct_values = mapping.len(),
            "Redacted document text"
        );

        RedactionOutcome {
            redacted,
            mapping,
            counts,
        }
    }
}

/// Replace every known placeholder token with its original value in one pass.
/// Unknown tokens are left as they are.
pub fn reidentify(redacted: &str, mapping: &RedactionMapping) -> String {
    TOKEN
        .replace_all(redacted, |caps: &Captures| {
            let token = &caps[0];
            mapping
                .get(token)
                .map(|entry| entry.value.clone())
                .unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}
