//! Regex detectors for PII

use lazy_static::lazy_static;
use regex::Regex;
use shared_types::PiiCategory;

/// Words that name a party's role rather than the party
pub const ROLE_WORDS: &[&str] = &[
    "landlord", "tenant", "tenants", "lessor", "lessee", "guarantor", "owner", "agent", "occupant",
    "resident", "premises", "property", "manager",
];

/// Leading words stripped from organization matches
const LEADING_NOISE: &[&str] = &[
    "the", "a", "an", "said", "this", "that", "by", "and", "between", "with", "from", "to", "of",
    "landlord", "tenant", "lessor", "lessee", "owner", "agent", "guarantor", "managed",
];

/// Entity suffixes marking an organization
pub const ORG_SUFFIXES: &[&str] = &[
    "LLC", "L.L.C.", "LLP", "LP", "Inc", "Inc.", "Corp", "Corp.", "Corporation", "Company", "Co.",
    "Ltd", "Ltd.", "Trust", "Realty", "Properties", "Management", "Associates", "Partners",
    "Holdings", "Group",
];

lazy_static! {
    static ref SSN: Vec<Regex> = vec![
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
        Regex::new(r"\b\d{3} \d{2} \d{4}\b").unwrap(),
    ];

    static ref PHONE: Vec<Regex> = vec![
        Regex::new(r"(?:\+1[ .-]?)?(?:\(\d{3}\) ?|\b\d{3}[-.])\d{3}[-.]\d{4}\b").unwrap(),
        Regex::new(r"\+1 ?\d{3} ?\d{3} ?\d{4}\b").unwrap(),
    ];

    static ref EMAIL: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();

    static ref CREDIT_CARD: Regex = Regex::new(r"\b(?:\d{4}[ -]?){3}\d{4}\b").unwrap();

    static ref ADDRESS: Vec<Regex> = vec![
        Regex::new(
            r"\b\d+[ \t]+(?:[A-Z][a-z]+[ \t]+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Circle|Cir|Way|Place|Pl|Terrace|Ter|Parkway|Pkwy)\b",
        )
        .unwrap(),
        Regex::new(r"(?i)\bP\.? ?O\.?[ \t]+Box[ \t]+\d+\b").unwrap(),
    ];

    static ref ORGANIZATION: Regex = Regex::new(
        r"\b(?:[A-Z][A-Za-z&'-]*[ \t]+){1,4}(?:LLC|L\.L\.C|LLP|LP|Inc|Corp|Corporation|Company|Ltd|Trust|Realty|Properties|Management|Associates|Partners|Holdings|Group)\b",
    )
    .unwrap();

    static ref HONORIFIC_NAME: Regex = Regex::new(
        r"\b(?:Mr|Mrs|Ms|Miss|Mx|Dr)\.?[ \t]+(?P<value>[A-Z][a-z]+(?:[ \t]+[A-Z]\.)?(?:[ \t]+[A-Z][a-z]+(?:-[A-Z][a-z]+)?)?)",
    )
    .unwrap();

    static ref PARTY_LABEL: Regex = Regex::new(
        r"\b(?:Landlord|Tenant|Lessor|Lessee|Guarantor|Owner|Agent|Occupant|Co-Tenant|Property Manager)s?[ \t]*:[ \t]*(?P<value>[A-Z][A-Za-z'.&-]*(?:[ \t]+[A-Z][A-Za-z'.&-]*){0,5})",
    )
    .unwrap();
}

/// A detected PII span, byte offsets into the scanned text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub start: usize,
    pub end: usize,
    pub category: PiiCategory,
}

impl Detection {
    fn new(start: usize, end: usize, category: PiiCategory) -> Self {
        Self { start, end, category }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

fn is_org_suffix(word: &str) -> bool {
    ORG_SUFFIXES.iter().any(|s| s.eq_ignore_ascii_case(word))
}

fn is_role_word(word: &str) -> bool {
    ROLE_WORDS.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Narrow `[start, end)` past leading noise words and trailing punctuation.
/// Returns `None` when nothing meaningful remains.
fn trim_span(text: &str, mut start: usize, mut end: usize, skip_noise: bool) -> Option<(usize, usize)> {
    if skip_noise {
        loop {
            let slice = &text[start..end];
            let word_len = slice.find([' ', '\t']).unwrap_or(slice.len());
            let word = &slice[..word_len];
            if word_len == slice.len() || !LEADING_NOISE.iter().any(|n| n.eq_ignore_ascii_case(word)) {
                break;
            }
            let rest = &slice[word_len..];
            start += word_len + (rest.len() - rest.trim_start().len());
        }
    }

    let trimmed = text[start..end].trim_end_matches(['.', ',', ';', ':', ' ', '\t']);
    end = start + trimmed.len();

    (end > start).then_some((start, end))
}

fn push_matches(text: &str, regexes: &[Regex], category: PiiCategory, out: &mut Vec<Detection>) {
    for re in regexes {
        out.extend(re.find_iter(text).map(|m| Detection::new(m.start(), m.end(), category)));
    }
}

/// Run every detector over `text`. Results may overlap; the caller resolves.
pub fn detect(text: &str) -> Vec<Detection> {
    let mut found = Vec::new();

    push_matches(text, &SSN, PiiCategory::Ssn, &mut found);
    push_matches(text, &PHONE, PiiCategory::Phone, &mut found);
    push_matches(text, std::slice::from_ref(&EMAIL), PiiCategory::Email, &mut found);
    push_matches(text, std::slice::from_ref(&CREDIT_CARD), PiiCategory::CreditCard, &mut found);

    for re in ADDRESS.iter() {
        for m in re.find_iter(text) {
            let lower = m.as_str().to_lowercase();
            if lower.contains("section") || lower.contains("chapter") {
                continue;
            }
            found.push(Detection::new(m.start(), m.end(), PiiCategory::Address));
        }
    }

    for m in ORGANIZATION.find_iter(text) {
        if let Some((start, end)) = trim_span(text, m.start(), m.end(), true) {
            let value = &text[start..end];
            // Bare suffix ("The Management") is not a name
            if value.split_whitespace().filter(|w| !is_org_suffix(w)).count() > 0 {
                found.push(Detection::new(start, end, PiiCategory::Organization));
            }
        }
    }

    for caps in HONORIFIC_NAME.captures_iter(text) {
        if let Some(m) = caps.name("value") {
            if let Some((start, end)) = trim_span(text, m.start(), m.end(), false) {
                found.push(Detection::new(start, end, PiiCategory::PersonName));
            }
        }
    }

    for caps in PARTY_LABEL.captures_iter(text) {
        let Some(m) = caps.name("value") else { continue };
        let Some((start, end)) = trim_span(text, m.start(), m.end(), false) else {
            continue;
        };
        let value = &text[start..end];
        let words: Vec<&str> = value.split_whitespace().collect();
        if words.iter().all(|w| is_role_word(w)) {
            continue;
        }
        let category = match words.last() {
            Some(last) if is_org_suffix(last) => PiiCategory::Organization,
            _ => PiiCategory::PersonName,
        };
        found.push(Detection::new(start, end, category));
    }

    found
}

/// Earliest span wins; among spans starting together, the longest
pub fn resolve_overlaps(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(|a, b| a.start.cmp(&b.start).then(b.len().cmp(&a.len())));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        if detection.is_empty() {
            continue;
        }
        if kept.last().is_some_and(|last| detection.start < last.end) {
            continue;
        }
        kept.push(detection);
    }
    kept
}

/// All whole-word occurrences of `needle` in `text`
pub fn find_whole_word(text: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    text.match_indices(needle)
        .filter(|(start, _)| {
            let end = start + needle.len();
            let before_ok = text[..*start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
            let after_ok = text[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
            before_ok && after_ok
        })
        .map(|(start, _)| (start, start + needle.len()))
        .collect()
}
