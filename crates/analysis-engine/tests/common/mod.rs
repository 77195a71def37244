//! Scripted doubles and fixtures shared by the pipeline tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use analysis_engine::{AnalysisEngine, EngineConfig, LanguageModel, MappingStore, ModelError};
use async_trait::async_trait;
use corpus_core::{KeywordLawIndex, LawCorpus, LawRetriever, RetrievalError};
use shared_crypto::SealingKey;
use shared_pdf::LayoutJsonExtractor;
use shared_types::{LawEntry, LayoutWord, PageLayout};
use tokio::sync::Semaphore;

pub const PAGE_ONE: &[&str] = &[
    "RESIDENTIAL LEASE AGREEMENT",
    "Landlord: ABC Properties LLC",
    "Tenant: Jane Doe",
    "Premises: 12 Elm Street, Boston, MA",
    "Tenant forfeits the security deposit if Jane Doe ends the lease early.",
    "Rent is due on the first day of each month.",
];

pub const PAGE_TWO: &[&str] = &[
    "Tenant shall pay all attorney fees in any dispute.",
    "Landlord shall make all repairs within 14 days.",
    "Tenant may keep one cat.",
    "Utilities are the responsibility of the tenant unless stated otherwise.",
    "Smoking is not permitted anywhere on the premises.",
];

/// Quotes as the model sees them, after redaction
pub const ILLEGAL_QUOTE: &str =
    "Tenant forfeits the security deposit if [NAME_REDACTED_1] ends the lease early.";
pub const RISKY_QUOTE: &str = "Tenant shall pay all attorney fees in any dispute.";
pub const FAVORABLE_QUOTE: &str = "Landlord shall make all repairs within 14 days.";

/// Windows of 400 chars with a 20 char overlap; the page break is the only
/// paragraph break, so the two pages land in two chunks.
pub const TWO_CHUNK_CONFIG: &str = r#"
[chunking]
max_tokens = 100
overlap_tokens = 5
slack_tokens = 99

[retrieval]
top_k = 3

[retrieval.retry]
max_attempts = 2
initial_backoff_ms = 1
max_backoff_ms = 2
"#;

pub const LAWS: &str = r#"[
    {"chapter": "186", "section": "15B", "title": "Security deposits",
     "text": "A landlord shall hold the tenant security deposit in escrow and may not retain it as a penalty when the lease ends."},
    {"chapter": "93A", "section": "9", "title": "Consumer protection",
     "text": "A tenant injured by an unfair practice, including lease terms shifting attorney fees, may recover double damages."},
    {"chapter": "186", "section": "14", "title": "Quiet enjoyment",
     "text": "A landlord shall make repairs required to keep the premises fit and shall not interfere with the tenant."}
]"#;

fn line_words(line: &str, top: f64) -> Vec<LayoutWord> {
    let mut x = 72.0;
    line.split_whitespace()
        .map(|word| {
            let width = word.chars().count() as f64 * 6.0;
            let w = LayoutWord {
                text: word.to_string(),
                x0: x,
                x1: x + width,
                top,
                bottom: top + 12.0,
            };
            x += width + 4.0;
            w
        })
        .collect()
}

pub fn page(page_number: u32, lines: &[&str]) -> PageLayout {
    PageLayout {
        page_number,
        width: 612.0,
        height: 792.0,
        words: lines
            .iter()
            .enumerate()
            .flat_map(|(i, line)| line_words(line, 72.0 + i as f64 * 16.0))
            .collect(),
    }
}

pub fn lease_layout_json() -> Vec<u8> {
    serde_json::to_vec(&vec![page(1, PAGE_ONE), page(2, PAGE_TWO)]).unwrap()
}

pub fn finding_json(category: &str, quote: &str, chapter: &str, section: &str, extra: &str) -> String {
    format!(
        r#"{{"category": "{}", "quote": "{}", "statute": {{"chapter": "{}", "section": "{}"}},
            "explanation": "scripted"{}}}"#,
        category, quote, chapter, section, extra
    )
}

pub fn lease_findings() -> Vec<(String, String)> {
    vec![
        (
            ILLEGAL_QUOTE.to_string(),
            finding_json(
                "illegal",
                ILLEGAL_QUOTE,
                "186",
                "15B",
                r#", "severity": "critical", "damages": {"amount_usd": 5000, "basis": "Deposit forfeiture"}"#,
            ),
        ),
        (
            RISKY_QUOTE.to_string(),
            finding_json(
                "risky",
                RISKY_QUOTE,
                "93A",
                "9",
                r#", "severity": "high", "damages": {"amount_usd": 1000, "basis": "Fee shifting"}"#,
            ),
        ),
        (
            FAVORABLE_QUOTE.to_string(),
            finding_json("favorable", FAVORABLE_QUOTE, "186", "14", ""),
        ),
    ]
}

/// Answers with every scripted finding whose quote appears in the chunk
pub struct ScriptedModel {
    findings: Vec<(String, String)>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(findings: Vec<(String, String)>) -> Self {
        Self {
            findings,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn excerpt_of(prompt: &str) -> &str {
    let start = prompt.find("LEASE EXCERPT").unwrap_or(0);
    let end = prompt.find("RELEVANT MASSACHUSETTS LAWS").unwrap_or(prompt.len());
    &prompt[start..end]
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let excerpt = excerpt_of(prompt);
        let matched: Vec<&str> = self
            .findings
            .iter()
            .filter(|(quote, _)| excerpt.contains(quote.as_str()))
            .map(|(_, json)| json.as_str())
            .collect();
        Ok(format!("```json\n{{\"findings\": [{}]}}\n```", matched.join(",")))
    }
}

/// Always answers with prose
pub struct ProseModel;

#[async_trait]
impl LanguageModel for ProseModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        Ok("This lease looks fine to me.".to_string())
    }
}

/// Blocks every call until the test releases it
pub struct GatedModel {
    pub entered: Semaphore,
    pub gate: Semaphore,
}

impl GatedModel {
    pub fn new() -> Self {
        Self {
            entered: Semaphore::new(0),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl LanguageModel for GatedModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        self.entered.add_permits(1);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ModelError::Unavailable("gate closed".into()))?;
        Ok(r#"{"findings": []}"#.to_string())
    }
}

/// Returns no statutes for any query
pub struct EmptyRetriever;

#[async_trait]
impl LawRetriever for EmptyRetriever {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<LawEntry>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Fails transiently for queries containing `trigger`, delegating otherwise
pub struct FlakyRetriever<R> {
    pub inner: R,
    pub trigger: &'static str,
    pub failures: AtomicUsize,
}

#[async_trait]
impl<R: LawRetriever> LawRetriever for FlakyRetriever<R> {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<LawEntry>, RetrievalError> {
        if query.contains(self.trigger) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(RetrievalError::Transient("backend timeout".into()));
        }
        self.inner.search(query, top_k).await
    }
}

pub fn law_index() -> KeywordLawIndex {
    KeywordLawIndex::build(&LawCorpus::from_json(LAWS).unwrap()).unwrap()
}

pub fn key() -> SealingKey {
    SealingKey::derive("integration-test-secret").unwrap()
}

pub fn engine(
    config: &str,
    store: Arc<dyn MappingStore>,
    retriever: Arc<dyn LawRetriever>,
    model: Arc<dyn LanguageModel>,
) -> AnalysisEngine {
    AnalysisEngine::new(
        EngineConfig::from_str(config).unwrap(),
        &key(),
        store,
        Arc::new(LayoutJsonExtractor),
        retriever,
        model,
    )
    .unwrap()
}
