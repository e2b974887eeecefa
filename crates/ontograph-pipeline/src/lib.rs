//! Ontograph ingestion pipeline.
//!
//! One execution per parsed document:
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────┐   ┌─────────────────────┐
//! │ Generating │──►│ Validating │──►│ Deciding │──►│ CommittingParallel  │
//! └────────────┘   └─────▲──────┘   └────┬─────┘   │ ┌───────┐ ┌───────┐ │
//!                        │               │ FAIL    │ │ graph │ │vector │ │
//!                 ┌──────┴───────┐       ▼         │ │ store │ │ index │ │
//!                 │OntologyCache │   ┌────────┐    │ └───┬───┘ └───┬───┘ │
//!                 │ (TTL, single │   │ Failed │    └─────┼─────────┼─────┘
//!                 │   flight)    │   └────▲───┘      ┌───▼─────────▼───┐
//!                 └──────────────┘        │          │     Joining     │
//!                                         └──────────┤ both ok? ──────►│ Succeeded
//!                                                    └─────────────────┘
//! ```
//!
//! Every stage except `Deciding` runs under the retry/backoff controller;
//! the whole execution runs under a hard deadline. Every terminal failure
//! writes exactly one dead-letter record.

pub mod cache;
pub mod commit;
pub mod config;
pub mod deadletter;
pub mod error;
pub mod generate;
pub mod orchestrator;
pub mod retry;
pub mod sinks;

pub use cache::{FileSchemaStore, HttpSchemaStore, OntologyCache, SchemaStore};
pub use commit::{
    run_graph_branch, run_vector_branch, stage_graph, BranchKind, BranchOutcome, BranchReport,
    GraphSink, LoadId, LoadStatus, StagedGraph, VectorRecord, VectorSink,
};
pub use config::PipelineConfig;
pub use deadletter::{DeadLetterRecord, DeadLetterSink, FileDeadLetterSink, MemoryDeadLetterSink};
pub use error::{from_sink, FailureClass, PipelineError, SchemaStoreError, SinkError};
pub use generate::{
    derive_vector_records, document_ontology, generate_facts, Chunk, DocumentMetadata,
    ParsedDocument,
};
pub use orchestrator::{
    ExecutionOutcome, ExecutionState, Orchestrator, Stage, StageEvent, TriggerEvent,
};
pub use retry::{retry, RetryPolicy};
