//! Ontograph domain core.
//!
//! Everything in this crate is synchronous and deterministic: the ontology
//! model (classes, properties, cardinality restrictions), the per-document
//! fact graph, the constraint validator that checks one against the other,
//! and the staging serializers for the graph-store bulk loader.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │  FactGraph   │────►│    validate()    │────►│ ValidationReport │
//! │ (1 document) │     │                  │     │  PASS/WARN/FAIL  │
//! └──────────────┘     └────────▲─────────┘     └──────────────────┘
//!                               │ read-only
//!                      ┌────────┴─────────┐
//!                      │  OntologyModel   │
//!                      │ classes/props/   │
//!                      │ restrictions     │
//!                      └──────────────────┘
//! ```
//!
//! The async pipeline (cache, retries, dual-sink commit, orchestration)
//! lives in `ontograph-pipeline`; this crate has no I/O so the validator can
//! be driven exhaustively in tests.

pub mod graph;
pub mod ontology;
pub mod report;
pub mod turtle;
pub mod validate;

pub use graph::{EntityId, Fact, FactGraph, FactObject, LiteralValue, SubjectFacts, TYPE_PROPERTY};
pub use ontology::{
    Cardinality, ClassDef, ModelError, OntologyModel, PropertyDef, PropertyKind, RangeDecl,
    Restriction, ScalarType, TermId,
};
pub use report::{
    SchemaWarning, ValidationReport, ValidationStatus, Violation, ViolationKind, WarningKind,
};
pub use validate::{validate, validate_at, ValidateError};
