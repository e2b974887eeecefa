//! Dual-sink committer: the two independent commit branches an accepted
//! fact graph flows into.
//!
//! Graph branch: serialize the graph to Turtle, stage it at a
//! content-addressed path, submit a bulk-load request, poll until the load
//! reaches a terminal status. A load that ends `Failed` is treated as
//! transient (bulk loaders routinely fail on capacity limits) and is
//! eligible for retry.
//!
//! Vector branch: batch-upsert derived records keyed by
//! `<documentId>-<chunkId>`. Upserts are idempotent by key, which retries
//! rely on: a partially applied batch can be resubmitted whole.
//!
//! The branches never communicate; each returns a [`BranchReport`] that the
//! orchestrator's join barrier aggregates.

use crate::error::{from_sink, PipelineError, SinkError};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use ontograph_model::{turtle, FactGraph};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// Sink contracts
// ============================================================================

/// Identifier a graph store assigns to one bulk load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(pub String);

/// Status of a bulk load, as reported by the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    InProgress,
    Completed { records: u64 },
    Failed { errors: u64 },
}

/// A fact graph staged for bulk loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedGraph {
    pub document_id: String,
    pub path: PathBuf,
    /// Hex SHA-256 of the staged bytes; also embedded in the path.
    pub content_digest: String,
    pub triple_count: usize,
}

/// Graph-store bulk loader.
#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn begin_load(&self, staged: &StagedGraph) -> Result<LoadId, SinkError>;
    async fn load_status(&self, id: &LoadId) -> Result<LoadStatus, SinkError>;
}

/// One record upserted into the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    /// `<documentId>-<chunkId>`; the index's stable upsert key.
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Vector search index. `upsert_batch` must be idempotent by record id.
#[async_trait]
pub trait VectorSink: Send + Sync {
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize, SinkError>;
}

// ============================================================================
// Branch reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    Graph,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BranchOutcome {
    Succeeded { detail: String },
    Failed { kind: String, message: String },
}

/// What one commit branch reports to the join barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchReport {
    pub branch: BranchKind,
    #[serde(flatten)]
    pub outcome: BranchOutcome,
    pub attempts: u32,
}

impl BranchReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, BranchOutcome::Succeeded { .. })
    }
}

// ============================================================================
// Staging
// ============================================================================

/// Serialize the graph to Turtle and write it below `staging_dir` at a path
/// derived from the document id and the content digest. Writing the same
/// graph twice lands on the same path with the same bytes.
pub async fn stage_graph(
    staging_dir: &Path,
    graph: &FactGraph,
) -> Result<StagedGraph, PipelineError> {
    let content = turtle::to_turtle(graph);
    let digest = hex_digest(content.as_bytes());
    let dir = staging_dir.join(&graph.document_id);
    let path = dir.join(format!("{}.ttl", &digest[..16]));

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| PipelineError::transient("staging", e.to_string()))?;
    tokio::fs::write(&path, content.as_bytes())
        .await
        .map_err(|e| PipelineError::transient("staging", e.to_string()))?;

    debug!(document_id = %graph.document_id, path = %path.display(), "staged fact graph");
    Ok(StagedGraph {
        document_id: graph.document_id.clone(),
        path,
        content_digest: digest,
        triple_count: graph.len(),
    })
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ============================================================================
// Branch drivers
// ============================================================================

/// Run the graph-store branch: stage once, then submit + poll under retry.
pub async fn run_graph_branch(
    sink: Arc<dyn GraphSink>,
    staging_dir: &Path,
    graph: &FactGraph,
    policy: RetryPolicy,
    poll_interval: Duration,
) -> BranchReport {
    let attempts = AtomicU32::new(0);

    let result = async {
        let staged = stage_graph(staging_dir, graph).await?;
        retry("graph-commit", policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let sink = sink.clone();
            let staged = staged.clone();
            async move { load_once(sink.as_ref(), &staged, poll_interval).await }
        })
        .await
    }
    .await;

    let attempts = attempts.load(Ordering::SeqCst).max(1);
    match result {
        Ok(records) => {
            info!(records, attempts, "graph-store commit complete");
            BranchReport {
                branch: BranchKind::Graph,
                outcome: BranchOutcome::Succeeded {
                    detail: format!("bulk load complete, {records} record(s)"),
                },
                attempts,
            }
        }
        Err(err) => BranchReport {
            branch: BranchKind::Graph,
            outcome: BranchOutcome::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
            attempts,
        },
    }
}

/// One submit-and-poll cycle against the bulk loader.
async fn load_once(
    sink: &dyn GraphSink,
    staged: &StagedGraph,
    poll_interval: Duration,
) -> Result<u64, PipelineError> {
    let load_id = sink
        .begin_load(staged)
        .await
        .map_err(|e| from_sink("graph-commit", e))?;
    debug!(load_id = %load_id.0, "bulk load submitted");

    loop {
        match sink
            .load_status(&load_id)
            .await
            .map_err(|e| from_sink("graph-commit", e))?
        {
            LoadStatus::InProgress => tokio::time::sleep(poll_interval).await,
            LoadStatus::Completed { records } => return Ok(records),
            LoadStatus::Failed { errors } => {
                // Retriable: bulk loaders fail on transient capacity limits.
                return Err(PipelineError::transient(
                    "graph-commit",
                    format!("bulk load {} failed with {errors} error(s)", load_id.0),
                ));
            }
        }
    }
}

/// Run the vector-index branch: batch-upsert under retry.
pub async fn run_vector_branch(
    sink: Arc<dyn VectorSink>,
    records: Vec<VectorRecord>,
    policy: RetryPolicy,
) -> BranchReport {
    let attempts = AtomicU32::new(0);

    let result = retry("vector-commit", policy, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        let sink = sink.clone();
        let records = records.clone();
        async move {
            sink.upsert_batch(&records)
                .await
                .map_err(|e| from_sink("vector-commit", e))
        }
    })
    .await;

    let attempts = attempts.load(Ordering::SeqCst).max(1);
    match result {
        Ok(upserted) => {
            info!(upserted, attempts, "vector-index commit complete");
            BranchReport {
                branch: BranchKind::Vector,
                outcome: BranchOutcome::Succeeded {
                    detail: format!("{upserted} record(s) upserted"),
                },
                attempts,
            }
        }
        Err(err) => BranchReport {
            branch: BranchKind::Vector,
            outcome: BranchOutcome::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
            attempts,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
