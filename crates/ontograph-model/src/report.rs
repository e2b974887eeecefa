//! Validation report: the verdict the validator hands to the orchestrator.
//!
//! Violations are fatal (the graph must not be committed); warnings record
//! schema gaps (terms the model does not know yet) and never block
//! ingestion, so the ontology can evolve ahead of producers.

use crate::graph::EntityId;
use crate::ontology::TermId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall verdict. `Fail` iff any violation, else `Warn` iff any warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    MissingRequiredProperty,
    CardinalityExceeded,
    CardinalityUnmet,
    DomainMismatch,
    RangeMismatch,
}

/// A schema non-conformance. Presence of any violation fails the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub kind: ViolationKind,
    pub subject: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<TermId>,
    pub property_name: TermId,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    UndefinedClass,
    UndefinedProperty,
}

/// A non-fatal schema gap (unknown class or property).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaWarning {
    pub kind: WarningKind,
    pub subject: EntityId,
    pub term: TermId,
    pub message: String,
}

/// Output of one `validate()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub violations: Vec<Violation>,
    pub warnings: Vec<SchemaWarning>,
    pub checked_at: DateTime<Utc>,
    pub checks_performed: Vec<String>,
    pub subjects_validated: usize,
    pub facts_validated: usize,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Pass
    }

    /// Commit is allowed for PASS and WARN, never for FAIL.
    pub fn accepted(&self) -> bool {
        self.status != ValidationStatus::Fail
    }

    /// One-line summary for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} violation(s), {} warning(s) across {} subject(s)",
            self.status,
            self.violations.len(),
            self.warnings.len(),
            self.subjects_validated,
        )
    }
}
