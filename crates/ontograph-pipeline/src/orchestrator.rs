//! Workflow orchestrator: one execution per parsed document.
//!
//! The lifecycle is an explicit state machine,
//! `Generating → Validating → Deciding → CommittingParallel → Joining →
//! Succeeded | Failed`, with a pure transition table so tests drive every
//! transition without I/O. `Deciding` is the only stage outside the retry
//! controller: a FAIL verdict is a producer defect, not a transient fault,
//! and goes straight to `Failed` with the report preserved.
//!
//! `CommittingParallel` forks the two commit branches as independently
//! cancellable tasks; `Joining` is the barrier that aggregates both
//! [`BranchReport`]s before any further transition. The whole execution runs
//! under a hard deadline; expiry aborts outstanding branch tasks
//! best-effort and forces `Failed`. Every exit other than `Succeeded`
//! writes exactly one dead-letter record.

use crate::cache::OntologyCache;
use crate::commit::{
    run_graph_branch, run_vector_branch, BranchKind, BranchOutcome, BranchReport, GraphSink,
    VectorSink,
};
use crate::config::PipelineConfig;
use crate::deadletter::{DeadLetterError, DeadLetterRecord, DeadLetterSink};
use crate::error::PipelineError;
use crate::generate::{derive_vector_records, generate_facts, ParsedDocument};
use crate::retry::retry;
use ontograph_model::{validate, SchemaWarning, ValidationReport};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generating,
    Validating,
    Deciding,
    CommittingParallel,
    Joining,
    Succeeded,
    Failed,
}

/// Events that move an execution between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    GenerationComplete,
    ValidationComplete,
    /// Deciding: report was PASS or WARN.
    Accepted,
    /// Deciding: report was FAIL.
    Rejected,
    BranchesSettled,
    AllSucceeded,
    AnyFailed,
    /// Any stage: unrecoverable error or deadline expiry.
    Fault,
}

impl Stage {
    /// The transition table. Undeclared combinations fall to `Failed`, so an
    /// execution can never wedge in a non-terminal stage.
    pub fn next(self, event: StageEvent) -> Stage {
        use Stage::*;
        use StageEvent::*;
        match (self, event) {
            (Generating, GenerationComplete) => Validating,
            (Validating, ValidationComplete) => Deciding,
            (Deciding, Accepted) => CommittingParallel,
            (Deciding, Rejected) => Failed,
            (CommittingParallel, BranchesSettled) => Joining,
            (Joining, AllSucceeded) => Succeeded,
            (Joining, AnyFailed) => Failed,
            (Succeeded, _) => Succeeded,
            (_, Fault) => Failed,
            _ => Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Generating => "generating",
            Stage::Validating => "validating",
            Stage::Deciding => "deciding",
            Stage::CommittingParallel => "committing-parallel",
            Stage::Joining => "joining",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        }
    }
}

// ============================================================================
// Execution state
// ============================================================================

/// The event that starts one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
    /// Defaults to the document id, so re-driving a dead-lettered document
    /// correlates with the failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl TriggerEvent {
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            source_location: None,
            correlation_id: None,
        }
    }
}

/// Mutable per-run state, owned exclusively by its execution.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub run_id: Uuid,
    pub correlation_id: String,
    pub document_id: String,
    pub stage: Stage,
    pub attempts: BTreeMap<String, u32>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Hard budget for the whole execution, measured from `started_at`.
    pub deadline: std::time::Duration,
    pub warnings: Vec<SchemaWarning>,
}

impl ExecutionState {
    fn new(trigger: &TriggerEvent, deadline: std::time::Duration) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            correlation_id: trigger
                .correlation_id
                .clone()
                .unwrap_or_else(|| trigger.document_id.clone()),
            document_id: trigger.document_id.clone(),
            stage: Stage::Generating,
            attempts: BTreeMap::new(),
            started_at: chrono::Utc::now(),
            deadline,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, event: StageEvent) {
        let next = self.stage.next(event);
        info!(
            run_id = %self.run_id,
            document_id = %self.document_id,
            from = self.stage.as_str(),
            to = next.as_str(),
            "stage transition"
        );
        self.stage = next;
    }

    fn record_attempts(&mut self, stage: &str, attempts: u32) {
        self.attempts.insert(stage.to_string(), attempts);
    }
}

/// Terminal result of one execution.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Succeeded {
        document_id: String,
        correlation_id: String,
        /// Warnings from a WARN verdict, carried forward for observability.
        warnings: Vec<SchemaWarning>,
        branch_reports: Vec<BranchReport>,
    },
    Failed(DeadLetterRecord),
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded { .. })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

struct StageFailure {
    error: PipelineError,
    branch_reports: Option<Vec<BranchReport>>,
}

impl StageFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            branch_reports: None,
        }
    }
}

pub struct Orchestrator {
    cache: Arc<OntologyCache>,
    graph_sink: Arc<dyn GraphSink>,
    vector_sink: Arc<dyn VectorSink>,
    dead_letter: Arc<dyn DeadLetterSink>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<OntologyCache>,
        graph_sink: Arc<dyn GraphSink>,
        vector_sink: Arc<dyn VectorSink>,
        dead_letter: Arc<dyn DeadLetterSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            cache,
            graph_sink,
            vector_sink,
            dead_letter,
            config,
        }
    }

    /// Run one document through the pipeline. `embeddings` maps chunk ids to
    /// externally computed vectors for the vector-index branch.
    pub async fn execute(
        &self,
        trigger: TriggerEvent,
        artifact: ParsedDocument,
        embeddings: BTreeMap<u32, Vec<f32>>,
    ) -> ExecutionOutcome {
        let mut state = ExecutionState::new(&trigger, self.config.execution_deadline);
        let span = info_span!(
            "execution",
            run_id = %state.run_id,
            document_id = %state.document_id
        );
        let aborts: Arc<Mutex<Vec<AbortHandle>>> = Arc::new(Mutex::new(Vec::new()));

        let timed = tokio::time::timeout(
            state.deadline,
            self.run(&mut state, &artifact, &embeddings, &aborts)
                .instrument(span),
        )
        .await;

        match timed {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(failure)) => {
                state.advance(StageEvent::Fault);
                self.dead_letter_and_fail(&state, failure).await
            }
            Err(_) => {
                // Deadline expired: abandon outstanding branch work.
                for handle in aborts.lock().drain(..) {
                    handle.abort();
                }
                warn!(
                    document_id = %state.document_id,
                    stage = state.stage.as_str(),
                    "execution deadline exceeded, aborting outstanding tasks"
                );
                let failure = StageFailure::from(PipelineError::Timeout {
                    elapsed: state.deadline,
                });
                state.advance(StageEvent::Fault);
                self.dead_letter_and_fail(&state, failure).await
            }
        }
    }

    async fn run(
        &self,
        state: &mut ExecutionState,
        artifact: &ParsedDocument,
        embeddings: &BTreeMap<u32, Vec<f32>>,
        aborts: &Arc<Mutex<Vec<AbortHandle>>>,
    ) -> Result<ExecutionOutcome, StageFailure> {
        // ---- Generating ----------------------------------------------------
        let generated_at = chrono::Utc::now();
        let graph = {
            let artifact = artifact.clone();
            retry("generating", self.config.retry, move || {
                let artifact = artifact.clone();
                async move { Ok(generate_facts(&artifact, generated_at)) }
            })
            .await
            .map_err(StageFailure::from)?
        };
        state.record_attempts("generating", 1);
        info!(facts = graph.len(), "fact graph generated");
        state.advance(StageEvent::GenerationComplete);

        // ---- Validating ----------------------------------------------------
        let report = self.validate_stage(state, &graph).await?;
        state.advance(StageEvent::ValidationComplete);

        // ---- Deciding (never retried) --------------------------------------
        info!(summary = %report.summary(), "validation verdict");
        if !report.accepted() {
            state.advance(StageEvent::Rejected);
            return Err(StageFailure::from(PipelineError::Validation {
                report: Box::new(report),
            }));
        }
        state.warnings = report.warnings.clone();
        state.advance(StageEvent::Accepted);

        // ---- CommittingParallel -------------------------------------------
        let records = derive_vector_records(artifact, embeddings);
        let graph_task = {
            let sink = self.graph_sink.clone();
            let staging_dir = self.config.staging_dir.clone();
            let graph = graph.clone();
            let policy = self.config.retry;
            let poll_interval = self.config.poll_interval;
            tokio::spawn(async move {
                run_graph_branch(sink, &staging_dir, &graph, policy, poll_interval).await
            })
        };
        let vector_task = {
            let sink = self.vector_sink.clone();
            let policy = self.config.retry;
            tokio::spawn(async move { run_vector_branch(sink, records, policy).await })
        };
        aborts.lock().push(graph_task.abort_handle());
        aborts.lock().push(vector_task.abort_handle());

        let (graph_result, vector_result) = tokio::join!(graph_task, vector_task);
        let graph_report = settle(BranchKind::Graph, graph_result);
        let vector_report = settle(BranchKind::Vector, vector_result);
        state.record_attempts("graph-commit", graph_report.attempts);
        state.record_attempts("vector-commit", vector_report.attempts);
        state.advance(StageEvent::BranchesSettled);

        // ---- Joining -------------------------------------------------------
        let branch_reports = vec![graph_report, vector_report];
        if branch_reports.iter().all(BranchReport::succeeded) {
            state.advance(StageEvent::AllSucceeded);
            info!(document_id = %state.document_id, "execution succeeded");
            return Ok(ExecutionOutcome::Succeeded {
                document_id: state.document_id.clone(),
                correlation_id: state.correlation_id.clone(),
                warnings: std::mem::take(&mut state.warnings),
                branch_reports,
            });
        }

        state.advance(StageEvent::AnyFailed);
        let failed: Vec<&BranchReport> =
            branch_reports.iter().filter(|r| !r.succeeded()).collect();
        let message = failed
            .iter()
            .map(|r| match &r.outcome {
                BranchOutcome::Failed { message, .. } => {
                    format!("{:?} branch: {message}", r.branch)
                }
                BranchOutcome::Succeeded { .. } => unreachable!("filtered to failures"),
            })
            .collect::<Vec<_>>()
            .join("; ");
        let stage: &'static str = match failed[0].branch {
            BranchKind::Graph => "graph-commit",
            BranchKind::Vector => "vector-commit",
        };
        Err(StageFailure {
            error: PipelineError::permanent(stage, message),
            branch_reports: Some(branch_reports),
        })
    }

    async fn validate_stage(
        &self,
        state: &mut ExecutionState,
        graph: &ontograph_model::FactGraph,
    ) -> Result<ValidationReport, StageFailure> {
        let mut attempts = 0u32;
        let result = retry("validating", self.config.retry, || {
            attempts += 1;
            let graph = graph.clone();
            let cache = self.cache.clone();
            async move {
                let model = cache.get().await?;
                validate(&graph, &model)
                    .map_err(|e| PipelineError::permanent("validating", e.to_string()))
            }
        })
        .await;
        state.record_attempts("validating", attempts.max(1));
        result.map_err(StageFailure::from)
    }

    async fn dead_letter_and_fail(
        &self,
        state: &ExecutionState,
        failure: StageFailure,
    ) -> ExecutionOutcome {
        let record = DeadLetterRecord {
            document_id: state.document_id.clone(),
            correlation_id: state.correlation_id.clone(),
            failed_stage: failed_stage_of(&failure),
            error: DeadLetterError {
                kind: failure.error.kind().to_string(),
                message: failure.error.to_string(),
            },
            attempts: state.attempts.clone(),
            branch_results: failure.branch_reports,
            timestamp: chrono::Utc::now(),
        };
        if let Err(err) = self.dead_letter.publish(&record).await {
            // The record still reaches the caller through the outcome.
            tracing::error!(error = %err, "failed to publish dead-letter record");
        }
        ExecutionOutcome::Failed(record)
    }
}

fn failed_stage_of(failure: &StageFailure) -> String {
    match &failure.error {
        PipelineError::Transient { stage, .. } | PipelineError::Permanent { stage, .. } => {
            (*stage).to_string()
        }
        PipelineError::RetriesExhausted { stage, .. } => (*stage).to_string(),
        PipelineError::SchemaUnavailable { .. } => "validating".to_string(),
        PipelineError::Validation { .. } => "deciding".to_string(),
        PipelineError::Timeout { .. } => "deadline".to_string(),
    }
}

/// Fold a branch task's join result into a report; a panicked or aborted
/// branch counts as a failed branch, not a crashed execution.
fn settle(
    branch: BranchKind,
    result: Result<BranchReport, tokio::task::JoinError>,
) -> BranchReport {
    match result {
        Ok(report) => report,
        Err(err) => BranchReport {
            branch,
            outcome: BranchOutcome::Failed {
                kind: "PermanentError".to_string(),
                message: format!("branch task did not complete: {err}"),
            },
            attempts: 0,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
