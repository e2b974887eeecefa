//! End-to-end orchestrator tests over scripted in-memory sinks.
//!
//! These drive the published failure-handling scenarios: validation FAIL
//! short-circuits before any commit, transient sink failures are absorbed
//! within the retry budget, an exhausted branch fails the execution while
//! the surviving branch's result is preserved, and the deadline forces a
//! timeout dead-letter.

use ontograph_pipeline::sinks::memory::{MemoryGraphSink, MemoryVectorSink};
use ontograph_pipeline::{
    BranchKind, Chunk, DocumentMetadata, ExecutionOutcome, MemoryDeadLetterSink, OntologyCache,
    Orchestrator, ParsedDocument, PipelineConfig, RetryPolicy, SchemaStore, SchemaStoreError,
    TriggerEvent,
};
use ontograph_model::OntologyModel;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

/// Serves the pipeline's document ontology, counting fetches.
struct FixtureStore;

#[async_trait]
impl SchemaStore for FixtureStore {
    async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError> {
        Ok(ontograph_pipeline::document_ontology())
    }
}

fn artifact(chunked: bool) -> ParsedDocument {
    ParsedDocument {
        document_id: "d1".into(),
        file_name: Some("d1.txt".into()),
        extracted_text: "Acme shipped widgets.".into(),
        chunks: if chunked {
            vec![Chunk {
                chunk_id: 0,
                text: "Acme shipped widgets.".into(),
                start_offset: 0,
                length: 21,
            }]
        } else {
            Vec::new()
        },
        metadata: DocumentMetadata::default(),
    }
}

fn embeddings() -> BTreeMap<u32, Vec<f32>> {
    BTreeMap::from([(0, vec![0.1, 0.2, 0.3])])
}

fn config(staging: &tempfile::TempDir) -> PipelineConfig {
    PipelineConfig {
        ontology_ttl: Duration::from_secs(3600),
        execution_deadline: Duration::from_secs(30 * 60),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        },
        poll_interval: Duration::from_millis(50),
        staging_dir: staging.path().to_path_buf(),
    }
}

struct Harness {
    orchestrator: Orchestrator,
    graph_sink: Arc<MemoryGraphSink>,
    vector_sink: Arc<MemoryVectorSink>,
    dead_letter: Arc<MemoryDeadLetterSink>,
    _staging: tempfile::TempDir,
}

fn harness(graph_sink: MemoryGraphSink, vector_sink: MemoryVectorSink) -> Harness {
    let staging = tempfile::tempdir().unwrap();
    let cfg = config(&staging);
    let cache = Arc::new(OntologyCache::new(Arc::new(FixtureStore), cfg.ontology_ttl));
    let graph_sink = Arc::new(graph_sink);
    let vector_sink = Arc::new(vector_sink);
    let dead_letter = Arc::new(MemoryDeadLetterSink::default());
    let orchestrator = Orchestrator::new(
        cache,
        graph_sink.clone(),
        vector_sink.clone(),
        dead_letter.clone(),
        cfg,
    );
    Harness {
        orchestrator,
        graph_sink,
        vector_sink,
        dead_letter,
        _staging: staging,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn clean_document_succeeds_with_both_branches() {
    let h = harness(MemoryGraphSink::completing(9), MemoryVectorSink::default());
    let outcome = h
        .orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(true), embeddings())
        .await;

    match outcome {
        ExecutionOutcome::Succeeded {
            branch_reports,
            warnings,
            correlation_id,
            ..
        } => {
            assert_eq!(branch_reports.len(), 2);
            assert!(branch_reports.iter().all(|r| r.succeeded()));
            assert!(warnings.is_empty());
            assert_eq!(correlation_id, "d1");
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert!(h.dead_letter.is_empty());
    assert_eq!(h.vector_sink.stored_ids(), vec!["d1-0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn validation_failure_never_invokes_the_committer() {
    // No chunks: the document ontology requires hasChunk atLeast(1).
    let h = harness(MemoryGraphSink::completing(9), MemoryVectorSink::default());
    let outcome = h
        .orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(false), embeddings())
        .await;

    let record = match outcome {
        ExecutionOutcome::Failed(record) => record,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(record.error.kind, "ValidationError");
    assert_eq!(record.failed_stage, "deciding");
    assert!(record.branch_results.is_none());

    // No partial commit of invalid data.
    assert_eq!(h.graph_sink.loads_started(), 0);
    assert_eq!(h.vector_sink.calls(), 0);
    assert_eq!(h.dead_letter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_graph_failures_within_budget_still_succeed() {
    // Two loads end FAILED, the third completes; vector commit is immediate.
    let h = harness(
        MemoryGraphSink::failing_loads(2, 9),
        MemoryVectorSink::default(),
    );
    let outcome = h
        .orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(true), embeddings())
        .await;

    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(h.graph_sink.loads_started(), 3);
    assert!(h.dead_letter.is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_graph_branch_fails_but_keeps_vector_result() {
    let h = harness(
        MemoryGraphSink::always_unavailable(),
        MemoryVectorSink::default(),
    );
    let outcome = h
        .orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(true), embeddings())
        .await;

    let record = match outcome {
        ExecutionOutcome::Failed(record) => record,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(record.failed_stage, "graph-commit");
    assert_eq!(record.error.kind, "PermanentError");
    assert_eq!(record.attempts.get("graph-commit"), Some(&3));

    // The join attaches both branches' results, including the success.
    let branches = record.branch_results.as_ref().expect("branch results");
    assert_eq!(branches.len(), 2);
    let vector = branches
        .iter()
        .find(|b| b.branch == BranchKind::Vector)
        .unwrap();
    assert!(vector.succeeded());

    // No compensating rollback: the vector data stays committed.
    assert_eq!(h.vector_sink.stored_count(), 1);
    assert_eq!(h.dead_letter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_vector_failures_within_budget_still_succeed() {
    let h = harness(
        MemoryGraphSink::completing(9),
        MemoryVectorSink::failing_first(2),
    );
    let outcome = h
        .orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(true), embeddings())
        .await;
    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(h.vector_sink.calls(), 3);
    assert_eq!(h.vector_sink.stored_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_sink_rejection_is_not_retried() {
    let h = harness(MemoryGraphSink::rejecting(), MemoryVectorSink::default());
    let outcome = h
        .orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(true), embeddings())
        .await;

    let record = match outcome {
        ExecutionOutcome::Failed(record) => record,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(record.attempts.get("graph-commit"), Some(&1));
    assert_eq!(h.dead_letter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_expiry_forces_timeout_dead_letter() {
    // A load that never completes: the deadline must cut it off.
    let staging = tempfile::tempdir().unwrap();
    let mut cfg = config(&staging);
    cfg.execution_deadline = Duration::from_secs(2);
    let cache = Arc::new(OntologyCache::new(Arc::new(FixtureStore), cfg.ontology_ttl));
    let graph_sink = Arc::new(MemoryGraphSink::completing_after(u64::MAX, 0));
    let dead_letter = Arc::new(MemoryDeadLetterSink::default());
    let orchestrator = Orchestrator::new(
        cache,
        graph_sink,
        Arc::new(MemoryVectorSink::default()),
        dead_letter.clone(),
        cfg,
    );
    let outcome = orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(true), embeddings())
        .await;

    let record = match outcome {
        ExecutionOutcome::Failed(record) => record,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(record.error.kind, "TimeoutError");
    assert_eq!(record.failed_stage, "deadline");
    assert_eq!(dead_letter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn warn_verdict_commits_and_carries_warnings_forward() {
    // An unknown-term warning must not block commit. A schema store whose
    // model lacks `hasType` turns that property into an UndefinedProperty
    // warning; easiest here is an artifact exercising documentType against
    // the full ontology minus that property.
    struct SparseStore;

    #[async_trait]
    impl SchemaStore for SparseStore {
        async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError> {
            let mut model = ontograph_pipeline::document_ontology();
            model.properties.retain(|p| p.id.as_str() != "onto:hasType");
            model.reindex();
            Ok(model)
        }
    }

    let staging = tempfile::tempdir().unwrap();
    let cfg = config(&staging);
    let cache = Arc::new(OntologyCache::new(Arc::new(SparseStore), cfg.ontology_ttl));
    let graph_sink = Arc::new(MemoryGraphSink::completing(9));
    let vector_sink = Arc::new(MemoryVectorSink::default());
    let dead_letter = Arc::new(MemoryDeadLetterSink::default());
    let orchestrator = Orchestrator::new(
        cache,
        graph_sink.clone(),
        vector_sink.clone(),
        dead_letter.clone(),
        cfg,
    );

    let mut doc = artifact(true);
    doc.metadata = DocumentMetadata {
        keywords: None,
        document_type: Some("note".into()),
        author: None,
    };

    let outcome = orchestrator
        .execute(TriggerEvent::for_document("d1"), doc, embeddings())
        .await;

    match outcome {
        ExecutionOutcome::Succeeded { warnings, .. } => {
            assert!(!warnings.is_empty(), "warnings must be carried forward");
        }
        other => panic!("expected success with warnings, got {other:?}"),
    }
    assert_eq!(graph_sink.loads_started(), 1);
    assert!(dead_letter.is_empty());
}

#[tokio::test]
async fn schema_unavailable_fails_without_commit() {
    struct DownStore;

    #[async_trait]
    impl SchemaStore for DownStore {
        async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError> {
            Err(SchemaStoreError::Unavailable("schema store down".into()))
        }
    }

    let staging = tempfile::tempdir().unwrap();
    let cfg = config(&staging);
    let cache = Arc::new(OntologyCache::new(Arc::new(DownStore), cfg.ontology_ttl));
    let graph_sink = Arc::new(MemoryGraphSink::completing(9));
    let vector_sink = Arc::new(MemoryVectorSink::default());
    let dead_letter = Arc::new(MemoryDeadLetterSink::default());
    let orchestrator = Orchestrator::new(
        cache,
        graph_sink.clone(),
        vector_sink.clone(),
        dead_letter.clone(),
        cfg,
    );

    let outcome = orchestrator
        .execute(TriggerEvent::for_document("d1"), artifact(true), embeddings())
        .await;

    let record = match outcome {
        ExecutionOutcome::Failed(record) => record,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(record.error.kind, "SchemaUnavailable");
    assert_eq!(graph_sink.loads_started(), 0);
    assert_eq!(vector_sink.calls(), 0);
    assert_eq!(dead_letter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_executions_share_one_schema_fetch() {
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingStore(AtomicU64);

    #[async_trait]
    impl SchemaStore for CountingStore {
        async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ontograph_pipeline::document_ontology())
        }
    }

    let staging = tempfile::tempdir().unwrap();
    let cfg = config(&staging);
    let store = Arc::new(CountingStore(AtomicU64::new(0)));
    let cache = Arc::new(OntologyCache::new(store.clone(), cfg.ontology_ttl));
    let dead_letter = Arc::new(MemoryDeadLetterSink::default());
    let orchestrator = Arc::new(Orchestrator::new(
        cache,
        Arc::new(MemoryGraphSink::completing(9)),
        Arc::new(MemoryVectorSink::default()),
        dead_letter.clone(),
        cfg,
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let orchestrator = orchestrator.clone();
        let mut doc = artifact(true);
        doc.document_id = format!("d{i}");
        handles.push(tokio::spawn(async move {
            orchestrator
                .execute(
                    TriggerEvent::for_document(doc.document_id.clone()),
                    doc,
                    embeddings(),
                )
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().succeeded());
    }
    assert_eq!(store.0.load(Ordering::SeqCst), 1);
    assert!(dead_letter.is_empty());
}
