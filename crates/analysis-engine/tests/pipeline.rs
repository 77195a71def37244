//! End-to-end runs of the analysis pipeline over a two-page lease

mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use analysis_engine::{FileMappingStore, InMemoryMappingStore, PipelineError};
use common::*;
use pretty_assertions::assert_eq;
use shared_types::{DocumentId, DocumentStatus, FindingCategory, HighlightColor, RiskLevel, Usd};

#[tokio::test]
async fn test_two_chunk_lease_report() {
    let model = Arc::new(ScriptedModel::new(lease_findings()));
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(law_index()),
        model.clone(),
    );

    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();
    let uploaded = engine.get(&id).await.unwrap();
    assert_eq!(uploaded.status, DocumentStatus::Uploaded);
    assert_eq!(uploaded.message, "Document uploaded and PII redacted");

    let report = engine.analyze(&id).await.unwrap();

    assert_eq!(report.document_info.total_chunks, 2);
    assert_eq!(report.power_imbalance_score, 25);
    assert_eq!(report.severity, RiskLevel::Medium);
    assert!(report.potential_recovery >= Usd::from_dollars(6_000));
    assert_eq!(report.potential_recovery, Usd::from_dollars(7_000));
    assert!(report.degraded_chunks.is_empty());

    assert_eq!(report.highlights.len(), 3);
    assert_eq!(report.highlights[0].color, HighlightColor::Red);
    assert!(matches!(
        report.highlights[1].color,
        HighlightColor::Orange | HighlightColor::Yellow
    ));
    assert_eq!(report.highlights[2].color, HighlightColor::Green);
    assert_eq!(report.highlights[0].finding.chunk_index, 0);
    assert_eq!(report.highlights[1].finding.chunk_index, 1);

    assert_eq!(report.top_issues[0].category, FindingCategory::Illegal);
    assert!(report.summary.contains("Power Imbalance Score: 25/100"));

    let record = engine.get(&id).await.unwrap();
    assert_eq!(record.status, DocumentStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.message, "Analysis complete");
    assert_eq!(record.analysis.as_ref(), Some(&report));
    assert!(record.analyzed_at.is_some());
}

#[tokio::test]
async fn test_personal_data_never_reaches_the_model() {
    let model = Arc::new(ScriptedModel::new(lease_findings()));
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(law_index()),
        model.clone(),
    );

    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();
    let report = engine.analyze(&id).await.unwrap();

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    for prompt in &prompts {
        assert!(!prompt.contains("Jane Doe"));
        assert!(!prompt.contains("ABC Properties"));
        assert!(!prompt.contains("12 Elm Street"));
    }

    // The stored report keeps the redacted quote
    let illegal = &report.highlights[0];
    assert_eq!(illegal.finding.quote, ILLEGAL_QUOTE);
    let record = engine.get(&id).await.unwrap();
    let stored = serde_json::to_string(&record).unwrap();
    assert!(!stored.contains("Jane Doe"));
}

#[tokio::test]
async fn test_highlights_are_placed_on_their_pages() {
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(law_index()),
        Arc::new(ScriptedModel::new(lease_findings())),
    );
    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();
    let report = engine.analyze(&id).await.unwrap();

    let pages: Vec<Option<u32>> = report
        .highlights
        .iter()
        .map(|h| h.position.as_ref().map(|p| p.page_number))
        .collect();
    assert_eq!(pages, vec![Some(1), Some(2), Some(2)]);

    for highlight in &report.highlights {
        let position = highlight.position.as_ref().unwrap();
        assert_eq!(position.rects.len(), 1);
        assert!(position.bounding_rect.x2 > position.bounding_rect.x1);
        assert!(position.bounding_rect.y2 > position.bounding_rect.y1);
    }
}

#[tokio::test]
async fn test_unparsable_responses_fail_the_document() {
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(law_index()),
        Arc::new(ProseModel),
    );
    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();

    let err = engine.analyze(&id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Consolidation(_)));

    let record = engine.get(&id).await.unwrap();
    assert_eq!(record.status, DocumentStatus::Failed);
    assert!(record.analysis.is_none());
    assert_eq!(record.progress, 0);
    assert!(record.message.starts_with("Analysis failed:"));
    assert!(record.error.is_some());
}

#[tokio::test]
async fn test_failed_retrieval_degrades_one_chunk() {
    let retriever = FlakyRetriever {
        inner: law_index(),
        trigger: "attorney fees",
        failures: AtomicUsize::new(0),
    };
    let retriever = Arc::new(retriever);
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        retriever.clone(),
        Arc::new(ScriptedModel::new(lease_findings())),
    );
    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();

    let report = engine.analyze(&id).await.unwrap();
    assert_eq!(report.degraded_chunks, vec![1]);
    assert_eq!(report.highlights.len(), 1);
    assert_eq!(report.power_imbalance_score, 20);
    assert!(report.summary.contains("1 of 2 chunk(s) could not be analyzed"));
    // Two attempts per the retry policy
    assert_eq!(retriever.failures.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_law_context_makes_findings_advisory() {
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(EmptyRetriever),
        Arc::new(ScriptedModel::new(lease_findings())),
    );
    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();

    let report = engine.analyze(&id).await.unwrap();
    assert_eq!(report.highlights.len(), 3);
    assert!(report.highlights.iter().all(|h| h.finding.advisory));
    assert_eq!(report.power_imbalance_score, 0);
    assert_eq!(report.potential_recovery, Usd::ZERO);
    assert!(report.top_issues.is_empty());
    assert!(report.summary.contains("advisory"));
}

#[tokio::test]
async fn test_completed_document_cannot_be_rerun() {
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(law_index()),
        Arc::new(ScriptedModel::new(lease_findings())),
    );
    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();
    engine.analyze(&id).await.unwrap();

    let err = engine.analyze(&id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Transition(_)));
    assert_eq!(engine.get(&id).await.unwrap().status, DocumentStatus::Completed);
}

#[tokio::test]
async fn test_unknown_document() {
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(EmptyRetriever),
        Arc::new(ProseModel),
    );
    let err = engine.analyze(&DocumentId::from("missing")).await.unwrap_err();
    assert!(matches!(err, PipelineError::DocumentNotFound(_)));
}

#[tokio::test]
async fn test_documents_run_concurrently() {
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(law_index()),
        Arc::new(ScriptedModel::new(lease_findings())),
    );
    let first = engine.ingest("a.json", &lease_layout_json()).await.unwrap();
    let second = engine.ingest("b.json", &lease_layout_json()).await.unwrap();
    assert_ne!(first, second);

    let (a, b) = tokio::join!(engine.spawn(first.clone()), engine.spawn(second.clone()));
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());
    assert_eq!(a.power_imbalance_score, b.power_imbalance_score);

    assert_eq!(engine.documents().list().await.len(), 2);
    for id in [first, second] {
        assert_eq!(engine.get(&id).await.unwrap().status, DocumentStatus::Completed);
    }
}

#[tokio::test]
async fn test_delete_erases_sealed_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileMappingStore::new(dir.path()));
    let engine = engine(
        TWO_CHUNK_CONFIG,
        store,
        Arc::new(EmptyRetriever),
        Arc::new(ProseModel),
    );
    let id = engine.ingest("lease.json", &lease_layout_json()).await.unwrap();

    let sealed = dir.path().join(format!("{}.enc", id));
    assert!(sealed.exists());
    let on_disk = std::fs::read_to_string(&sealed).unwrap();
    assert!(!on_disk.contains("Jane Doe"));

    engine.delete(&id).await.unwrap();
    assert!(!sealed.exists());
    assert!(engine.get(&id).await.is_none());
    assert!(matches!(
        engine.analyze(&id).await.unwrap_err(),
        PipelineError::DocumentNotFound(_)
    ));
    assert!(matches!(
        engine.delete(&id).await.unwrap_err(),
        PipelineError::DocumentNotFound(_)
    ));
}

#[tokio::test]
async fn test_empty_layout_is_rejected_at_ingest() {
    let engine = engine(
        TWO_CHUNK_CONFIG,
        Arc::new(InMemoryMappingStore::new()),
        Arc::new(EmptyRetriever),
        Arc::new(ProseModel),
    );
    let empty = serde_json::to_vec(&vec![page(1, &[])]).unwrap();
    let err = engine.ingest("blank.json", &empty).await.unwrap_err();
    assert!(matches!(err, PipelineError::Extraction(_)));
    assert!(engine.documents().list().await.is_empty());
}
