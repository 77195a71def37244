use std::sync::Arc;

use async_trait::async_trait;
use shared_types::LawEntry;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tracing::{debug, info};

use super::normalize_score;
use crate::corpus::{CorpusError, LawCorpus, LawRecord};
use crate::retriever::{LawRetriever, RetrievalError};

/// Upper bound on distinct query terms sent to the parser
const MAX_QUERY_TERMS: usize = 64;

/// Writer heap; Tantivy requires at least 15MB per indexing thread
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 keyword index over statute sections
///
/// The index lives entirely in RAM and is built once from a `LawCorpus`.
/// Chunk text is used directly as the query: it is reduced to plain
/// alphanumeric terms first so lease punctuation ("AND", quotes, colons)
/// never reaches the query grammar.
///
/// # Schema
///
/// - `ord`: position of the record in the corpus (u64, STORED)
/// - `title`: section title, boosted (TEXT)
/// - `text`: section body (TEXT)
///
/// # Example
///
/// ```no_run
/// use corpus_core::{KeywordLawIndex, LawCorpus, LawRetriever};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let corpus = LawCorpus::from_json(r#"[{"chapter":"186","section":"15B","text":"security deposit"}]"#)?;
/// let index = KeywordLawIndex::build(&corpus)?;
/// let laws = index.search("Tenant shall pay a security deposit", 8).await?;
/// # Ok(())
/// # }
/// ```
///
/// Queries run on the blocking pool; cloning shares the same index.
#[derive(Clone)]
pub struct KeywordLawIndex {
    inner: Arc<IndexState>,
}

struct IndexState {
    index: Index,
    reader: IndexReader,
    ord_field: Field,
    title_field: Field,
    text_field: Field,
    records: Vec<LawRecord>,
}

impl KeywordLawIndex {
    /// Index every record of `corpus`
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::Index` if the writer cannot be created or the
    /// commit fails.
    pub fn build(corpus: &LawCorpus) -> Result<Self, CorpusError> {
        let mut schema_builder = Schema::builder();
        let ord_field = schema_builder.add_u64_field("ord", STORED);
        let title_field = schema_builder.add_text_field("title", TEXT);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;

        for (ord, record) in corpus.records().iter().enumerate() {
            let mut doc = TantivyDocument::new();
            doc.add_u64(ord_field, ord as u64);
            doc.add_text(title_field, record.title.as_deref().unwrap_or(""));
            doc.add_text(text_field, &record.text);
            writer.add_document(doc)?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        info!(sections = corpus.len(), "Built keyword law index");

        Ok(Self {
            inner: Arc::new(IndexState {
                index,
                reader,
                ord_field,
                title_field,
                text_field,
                records: corpus.records().to_vec(),
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }
}

impl IndexState {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<LawEntry>, RetrievalError> {
        let terms = sanitize_query(query);
        if terms.is_empty() || top_k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }

        let mut parser = QueryParser::for_index(&self.index, vec![self.title_field, self.text_field]);
        parser.set_field_boost(self.title_field, 2.0);

        let parsed = parser
            .parse_query(&terms.join(" "))
            .map_err(|e| RetrievalError::Permanent(format!("query parse: {}", e)))?;

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(top_k))
            .map_err(|e| RetrievalError::Transient(format!("search: {}", e)))?;

        let mut entries = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| RetrievalError::Transient(format!("stored doc: {}", e)))?;
            let Some(record) = doc
                .get_first(self.ord_field)
                .and_then(|v| v.as_u64())
                .and_then(|ord| self.records.get(ord as usize))
            else {
                continue;
            };

            entries.push(LawEntry {
                chapter: record.chapter.clone(),
                section: record.section.clone(),
                title: record.title.clone(),
                text: record.text.clone(),
                score: normalize_score(score),
            });
        }

        debug!(terms = terms.len(), results = entries.len(), "Keyword law search");
        Ok(entries)
    }
}

#[async_trait]
impl LawRetriever for KeywordLawIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<LawEntry>, RetrievalError> {
        let state = Arc::clone(&self.inner);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || state.search(&query, top_k))
            .await
            .map_err(|e| RetrievalError::Transient(format!("search task: {}", e)))?
    }
}

/// Lowercased alphanumeric terms, de-duplicated in first-seen order.
/// Single characters and the parser's boolean keywords are dropped.
fn sanitize_query(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split(|c: char| !c.is_alphanumeric()) {
        if raw.chars().count() < 2 {
            continue;
        }
        let term = raw.to_lowercase();
        if matches!(term.as_str(), "and" | "or" | "not") || terms.contains(&term) {
            continue;
        }
        terms.push(term);
        if terms.len() == MAX_QUERY_TERMS {
            break;
        }
    }
    terms
}
