//! Pipeline error taxonomy.
//!
//! The retry controller keys off [`FailureClass`]: transient faults
//! (network or service unavailability at any I/O boundary) are retried up to
//! the policy budget; permanent faults (schema, validation, programmer
//! errors) surface immediately. Validation failure is carried with its full
//! report so the dead-letter record can preserve the violation detail.

use ontograph_model::ValidationReport;
use std::time::Duration;
use thiserror::Error;

/// How the retry controller treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt after backoff.
    Transient,
    /// Retrying cannot help; surface immediately.
    Permanent,
}

/// Errors from a schema store fetch.
#[derive(Debug, Error)]
pub enum SchemaStoreError {
    #[error("schema store unavailable: {0}")]
    Unavailable(String),
    #[error("schema document malformed: {0}")]
    Malformed(String),
}

impl SchemaStoreError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            SchemaStoreError::Unavailable(_) => FailureClass::Transient,
            SchemaStoreError::Malformed(_) => FailureClass::Permanent,
        }
    }
}

/// Errors from a commit sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Service/network unavailability, including a bulk load that ended in
    /// `Failed` status; loaders commonly fail on transient capacity limits.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    /// The sink understood the request and refused it.
    #[error("sink rejected request: {0}")]
    Rejected(String),
    /// The sink answered with something we cannot interpret.
    #[error("sink protocol error: {0}")]
    Protocol(String),
}

impl SinkError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            SinkError::Unavailable(_) => FailureClass::Transient,
            SinkError::Rejected(_) | SinkError::Protocol(_) => FailureClass::Permanent,
        }
    }
}

/// Top-level pipeline error, one variant per taxonomy entry.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transient failure in {stage}: {message}")]
    Transient { stage: &'static str, message: String },

    #[error("permanent failure in {stage}: {message}")]
    Permanent { stage: &'static str, message: String },

    #[error("no ontology model available: {message}")]
    SchemaUnavailable { message: String },

    #[error("validation failed: {} violation(s)", .report.violations.len())]
    Validation { report: Box<ValidationReport> },

    #[error("execution deadline exceeded after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("{stage} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn transient(stage: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Transient {
            stage,
            message: message.into(),
        }
    }

    pub fn permanent(stage: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Permanent {
            stage,
            message: message.into(),
        }
    }

    pub fn failure_class(&self) -> FailureClass {
        match self {
            PipelineError::Transient { .. } => FailureClass::Transient,
            PipelineError::Permanent { .. }
            | PipelineError::SchemaUnavailable { .. }
            | PipelineError::Validation { .. }
            | PipelineError::Timeout { .. }
            | PipelineError::RetriesExhausted { .. } => FailureClass::Permanent,
        }
    }

    /// Short machine-readable kind for dead-letter records.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transient { .. } => "TransientError",
            PipelineError::Permanent { .. } => "PermanentError",
            PipelineError::SchemaUnavailable { .. } => "SchemaUnavailable",
            PipelineError::Validation { .. } => "ValidationError",
            PipelineError::Timeout { .. } => "TimeoutError",
            PipelineError::RetriesExhausted { .. } => "RetriesExhausted",
        }
    }
}

/// Map a sink error into the pipeline taxonomy, tagging the stage.
pub fn from_sink(stage: &'static str, err: SinkError) -> PipelineError {
    match err.failure_class() {
        FailureClass::Transient => PipelineError::transient(stage, err.to_string()),
        FailureClass::Permanent => PipelineError::permanent(stage, err.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
