//! Constraint validator: checks a fact graph against the ontology model.
//!
//! The validator is a pure function over `(graph, model)`. For each subject
//! it collects the declared classes plus their transitive ancestors, applies
//! every cardinality restriction reachable through that closure, and checks
//! each fact's property domain and (for entity objects) range. Terms the
//! model does not define produce warnings, never violations: unknown
//! vocabulary must not block ingestion while the schema evolves.
//!
//! Output order is stable: subjects sorted, then declared-class order, then
//! restriction declaration order, then property order. Two calls on the same
//! inputs produce identical reports (up to `checked_at`, which the caller
//! can pin via [`validate_at`]).

use crate::graph::{FactGraph, SubjectFacts};
use crate::ontology::{Cardinality, OntologyModel, PropertyKind, RangeDecl, TermId};
use crate::report::{
    SchemaWarning, ValidationReport, ValidationStatus, Violation, ViolationKind, WarningKind,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

/// Programmer errors, distinct from ontology violations: these mean the call
/// itself was invalid, not that the data failed validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("ontology model is empty; refusing to validate against nothing")]
    EmptyModel,
    #[error("malformed fact graph: fact #{index} has an empty subject")]
    MalformedGraph { index: usize },
}

/// Validate `graph` against `model`, stamping the report with the current
/// time. See [`validate_at`] for the deterministic form.
pub fn validate(graph: &FactGraph, model: &OntologyModel) -> Result<ValidationReport, ValidateError> {
    validate_at(graph, model, Utc::now())
}

/// Validate `graph` against `model` with an explicit report timestamp.
pub fn validate_at(
    graph: &FactGraph,
    model: &OntologyModel,
    checked_at: DateTime<Utc>,
) -> Result<ValidationReport, ValidateError> {
    if model.is_empty() {
        return Err(ValidateError::EmptyModel);
    }
    for (index, fact) in graph.facts.iter().enumerate() {
        if fact.subject.as_str().is_empty() {
            return Err(ValidateError::MalformedGraph { index });
        }
    }

    let mut violations = Vec::new();
    let mut warnings = Vec::new();

    let subjects = graph.subjects();

    for (subject, facts) in &subjects {
        let closure = class_closure(model, facts, subject, &mut warnings);

        check_restrictions(model, subject, facts, &closure, &mut violations);
        check_domains_and_ranges(
            model,
            subject,
            facts,
            &closure,
            &subjects,
            &mut violations,
            &mut warnings,
        );
    }

    let status = if !violations.is_empty() {
        ValidationStatus::Fail
    } else if !warnings.is_empty() {
        ValidationStatus::Warn
    } else {
        ValidationStatus::Pass
    };

    Ok(ValidationReport {
        status,
        violations,
        warnings,
        checked_at,
        checks_performed: vec![
            "class_membership".to_string(),
            "cardinality_restrictions".to_string(),
            "property_domains".to_string(),
            "property_ranges".to_string(),
        ],
        subjects_validated: subjects.len(),
        facts_validated: graph.facts.len(),
    })
}

/// Declared classes in declaration order, followed by their sorted ancestor
/// closure. Unknown declared classes are reported as warnings and still
/// included (their restrictions simply don't exist).
fn class_closure(
    model: &OntologyModel,
    facts: &SubjectFacts,
    subject: &crate::graph::EntityId,
    warnings: &mut Vec<SchemaWarning>,
) -> Vec<TermId> {
    let mut closure: Vec<TermId> = Vec::new();
    let mut seen: BTreeSet<TermId> = BTreeSet::new();
    let mut ancestors: BTreeSet<TermId> = BTreeSet::new();

    for class in &facts.types {
        if model.class(class).is_none() {
            warnings.push(SchemaWarning {
                kind: WarningKind::UndefinedClass,
                subject: subject.clone(),
                term: class.clone(),
                message: format!("subject {subject} has type {class} which is not defined in the ontology"),
            });
        }
        if seen.insert(class.clone()) {
            closure.push(class.clone());
        }
        ancestors.extend(model.ancestors(class));
    }
    for class in ancestors {
        if seen.insert(class.clone()) {
            closure.push(class);
        }
    }
    closure
}

fn check_restrictions(
    model: &OntologyModel,
    subject: &crate::graph::EntityId,
    facts: &SubjectFacts,
    closure: &[TermId],
    violations: &mut Vec<Violation>,
) {
    for class in closure {
        for restriction in model.restrictions_of(class) {
            let count = facts
                .properties
                .get(&restriction.property)
                .map(|v| v.len())
                .unwrap_or(0) as u32;

            let violation = match restriction.cardinality {
                Cardinality::Exactly(n) if count > n => Some((
                    ViolationKind::CardinalityExceeded,
                    format!(
                        "property {} must occur exactly {n} time(s), found {count}",
                        restriction.property
                    ),
                )),
                Cardinality::Exactly(n) if count == 0 && n > 0 => Some((
                    ViolationKind::MissingRequiredProperty,
                    format!(
                        "required property {} is missing ({} expected)",
                        restriction.property, restriction.cardinality
                    ),
                )),
                Cardinality::Exactly(n) if count < n => Some((
                    ViolationKind::CardinalityUnmet,
                    format!(
                        "property {} must occur exactly {n} time(s), found {count}",
                        restriction.property
                    ),
                )),
                Cardinality::AtLeast(n) if count < n => Some((
                    ViolationKind::CardinalityUnmet,
                    format!(
                        "property {} must occur at least {n} time(s), found {count}",
                        restriction.property
                    ),
                )),
                Cardinality::AtMost(n) if count > n => Some((
                    ViolationKind::CardinalityExceeded,
                    format!(
                        "property {} must occur at most {n} time(s), found {count}",
                        restriction.property
                    ),
                )),
                _ => None,
            };

            if let Some((kind, message)) = violation {
                violations.push(Violation {
                    kind,
                    subject: subject.clone(),
                    class_name: Some(class.clone()),
                    property_name: restriction.property.clone(),
                    message,
                });
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn check_domains_and_ranges(
    model: &OntologyModel,
    subject: &crate::graph::EntityId,
    facts: &SubjectFacts,
    closure: &[TermId],
    all_subjects: &std::collections::BTreeMap<crate::graph::EntityId, SubjectFacts>,
    violations: &mut Vec<Violation>,
    warnings: &mut Vec<SchemaWarning>,
) {
    for (property, objects) in &facts.properties {
        let Some(prop_def) = model.property(property) else {
            warnings.push(SchemaWarning {
                kind: WarningKind::UndefinedProperty,
                subject: subject.clone(),
                term: property.clone(),
                message: format!("property {property} on {subject} is not defined in the ontology"),
            });
            continue;
        };

        if let Some(domain) = &prop_def.domain {
            if !closure.contains(domain) {
                violations.push(Violation {
                    kind: ViolationKind::DomainMismatch,
                    subject: subject.clone(),
                    class_name: Some(domain.clone()),
                    property_name: property.clone(),
                    message: format!(
                        "property {property} expects domain {domain}, subject {subject} is not typed as such"
                    ),
                });
            }
        }

        // Range checks only apply to entity-valued objects of relational
        // properties with a declared range class. Literal ranges are typed
        // at construction and need no graph-level check.
        let range_class = match (&prop_def.kind, &prop_def.range) {
            (PropertyKind::Relational, Some(RangeDecl::Class { class })) => Some(class),
            _ => None,
        };
        if let Some(range_class) = range_class {
            for object in objects {
                let Some(object_id) = object.as_entity() else {
                    continue;
                };
                let object_classes = all_subjects
                    .get(object_id)
                    .map(|s| s.types.as_slice())
                    .unwrap_or(&[]);
                let in_range = object_classes
                    .iter()
                    .any(|c| model.is_subclass_of(c, range_class));
                if !in_range {
                    violations.push(Violation {
                        kind: ViolationKind::RangeMismatch,
                        subject: subject.clone(),
                        class_name: Some(range_class.clone()),
                        property_name: property.clone(),
                        message: format!(
                            "object {object_id} of {property} is not typed as range class {range_class}"
                        ),
                    });
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Fact, FactObject};
    use crate::ontology::{Cardinality, ClassDef, PropertyDef, Restriction, ScalarType};
    use chrono::TimeZone;

    /// The document ontology exercised by the published scenarios.
    fn document_model() -> OntologyModel {
        OntologyModel::new("doc-ontology-1")
            .with_class(ClassDef::new("onto:Document"))
            .with_class(ClassDef::new("onto:TextChunk"))
            .with_class(ClassDef::new("onto:Embedding"))
            .with_property(
                PropertyDef::literal("onto:hasId", ScalarType::String).with_domain("onto:Document"),
            )
            .with_property(
                PropertyDef::literal("onto:hasFileName", ScalarType::String)
                    .with_domain("onto:Document"),
            )
            .with_property(
                PropertyDef::literal("onto:createdAt", ScalarType::Timestamp)
                    .with_domain("onto:Document"),
            )
            .with_property(
                PropertyDef::relational("onto:hasChunk")
                    .with_domain("onto:Document")
                    .with_range_class("onto:TextChunk"),
            )
            .with_property(
                PropertyDef::relational("onto:hasEmbedding")
                    .with_domain("onto:TextChunk")
                    .with_range_class("onto:Embedding"),
            )
            .with_restriction(Restriction {
                on_class: TermId::from("onto:Document"),
                property: TermId::from("onto:hasId"),
                cardinality: Cardinality::Exactly(1),
            })
            .with_restriction(Restriction {
                on_class: TermId::from("onto:Document"),
                property: TermId::from("onto:hasChunk"),
                cardinality: Cardinality::AtLeast(1),
            })
            .with_restriction(Restriction {
                on_class: TermId::from("onto:TextChunk"),
                property: TermId::from("onto:hasEmbedding"),
                cardinality: Cardinality::AtMost(1),
            })
    }

    fn document_graph(with_chunk: bool) -> FactGraph {
        let mut graph = FactGraph::new("d1");
        graph.push(Fact::typed("doc:d1", "onto:Document"));
        graph.push(Fact::new("doc:d1", "onto:hasId", FactObject::string("d1")));
        graph.push(Fact::new(
            "doc:d1",
            "onto:hasFileName",
            FactObject::string("d1.txt"),
        ));
        graph.push(Fact::new(
            "doc:d1",
            "onto:createdAt",
            FactObject::timestamp(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        ));
        if with_chunk {
            graph.push(Fact::typed("doc:d1/chunk/0", "onto:TextChunk"));
            graph.push(Fact::new(
                "doc:d1",
                "onto:hasChunk",
                FactObject::entity("doc:d1/chunk/0"),
            ));
        }
        graph
    }

    #[test]
    fn missing_at_least_one_chunk_fails_with_cardinality_unmet() {
        let report = validate(&document_graph(false), &document_model()).unwrap();
        assert_eq!(report.status, ValidationStatus::Fail);
        let v = report
            .violations
            .iter()
            .find(|v| v.property_name == TermId::from("onto:hasChunk"))
            .expect("hasChunk violation");
        assert_eq!(v.kind, ViolationKind::CardinalityUnmet);
    }

    #[test]
    fn satisfying_every_restriction_passes_cleanly() {
        let report = validate(&document_graph(true), &document_model()).unwrap();
        assert_eq!(report.status, ValidationStatus::Pass);
        assert!(report.violations.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_exactly_one_property_is_missing_required() {
        let mut graph = FactGraph::new("d1");
        graph.push(Fact::typed("doc:d1", "onto:Document"));
        graph.push(Fact::typed("doc:d1/chunk/0", "onto:TextChunk"));
        graph.push(Fact::new(
            "doc:d1",
            "onto:hasChunk",
            FactObject::entity("doc:d1/chunk/0"),
        ));
        let report = validate(&graph, &document_model()).unwrap();
        assert_eq!(report.status, ValidationStatus::Fail);
        let v = report
            .violations
            .iter()
            .find(|v| v.property_name == TermId::from("onto:hasId"))
            .expect("hasId violation");
        assert_eq!(v.kind, ViolationKind::MissingRequiredProperty);
    }

    #[test]
    fn two_values_under_exactly_one_is_exceeded() {
        let mut graph = document_graph(true);
        graph.push(Fact::new("doc:d1", "onto:hasId", FactObject::string("dup")));
        let report = validate(&graph, &document_model()).unwrap();
        let v = report
            .violations
            .iter()
            .find(|v| v.property_name == TermId::from("onto:hasId"))
            .expect("hasId violation");
        assert_eq!(v.kind, ViolationKind::CardinalityExceeded);
    }

    #[test]
    fn two_embeddings_under_at_most_one_is_exceeded() {
        let mut graph = document_graph(true);
        graph.push(Fact::typed("emb:a", "onto:Embedding"));
        graph.push(Fact::typed("emb:b", "onto:Embedding"));
        graph.push(Fact::new(
            "doc:d1/chunk/0",
            "onto:hasEmbedding",
            FactObject::entity("emb:a"),
        ));
        graph.push(Fact::new(
            "doc:d1/chunk/0",
            "onto:hasEmbedding",
            FactObject::entity("emb:b"),
        ));
        let report = validate(&graph, &document_model()).unwrap();
        assert_eq!(report.status, ValidationStatus::Fail);
        let v = report
            .violations
            .iter()
            .find(|v| v.kind == ViolationKind::CardinalityExceeded)
            .expect("exceeded violation");
        assert_eq!(v.property_name, TermId::from("onto:hasEmbedding"));
    }

    #[test]
    fn unknown_class_warns_but_never_fails() {
        let mut graph = document_graph(true);
        graph.push(Fact::typed("doc:d1", "onto:Novelty"));
        let report = validate(&graph, &document_model()).unwrap();
        assert_eq!(report.status, ValidationStatus::Warn);
        assert!(report.violations.is_empty());
        let w = &report.warnings[0];
        assert_eq!(w.kind, WarningKind::UndefinedClass);
        assert_eq!(w.term, TermId::from("onto:Novelty"));
    }

    #[test]
    fn unknown_property_warns_but_never_fails() {
        let mut graph = document_graph(true);
        graph.push(Fact::new(
            "doc:d1",
            "onto:hasNoSuchThing",
            FactObject::string("x"),
        ));
        let report = validate(&graph, &document_model()).unwrap();
        assert_eq!(report.status, ValidationStatus::Warn);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::UndefinedProperty));
    }

    #[test]
    fn domain_mismatch_is_a_violation() {
        let mut graph = document_graph(true);
        // hasEmbedding's domain is TextChunk, not Document.
        graph.push(Fact::typed("emb:a", "onto:Embedding"));
        graph.push(Fact::new(
            "doc:d1",
            "onto:hasEmbedding",
            FactObject::entity("emb:a"),
        ));
        let report = validate(&graph, &document_model()).unwrap();
        assert_eq!(report.status, ValidationStatus::Fail);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::DomainMismatch));
    }

    #[test]
    fn range_mismatch_is_a_violation() {
        let mut graph = document_graph(true);
        // Object of hasChunk typed as Document, not TextChunk.
        graph.push(Fact::typed("doc:other", "onto:Document"));
        graph.push(Fact::new(
            "doc:d1",
            "onto:hasChunk",
            FactObject::entity("doc:other"),
        ));
        let report = validate(&graph, &document_model()).unwrap();
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::RangeMismatch));
    }

    #[test]
    fn range_accepts_subclass_of_range_class() {
        let model = document_model()
            .with_class(ClassDef::new("onto:CodeChunk").with_parent("onto:TextChunk"));
        let mut graph = FactGraph::new("d1");
        graph.push(Fact::typed("doc:d1", "onto:Document"));
        graph.push(Fact::new("doc:d1", "onto:hasId", FactObject::string("d1")));
        graph.push(Fact::typed("doc:d1/chunk/0", "onto:CodeChunk"));
        graph.push(Fact::new(
            "doc:d1",
            "onto:hasChunk",
            FactObject::entity("doc:d1/chunk/0"),
        ));
        let report = validate(&graph, &model).unwrap();
        assert!(!report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::RangeMismatch));
    }

    #[test]
    fn restrictions_apply_through_ancestor_classes() {
        let model = document_model()
            .with_class(ClassDef::new("onto:Report").with_parent("onto:Document"));
        let mut graph = FactGraph::new("d1");
        graph.push(Fact::typed("doc:d1", "onto:Report"));
        let report = validate(&graph, &model).unwrap();
        // Inherits Document's `hasId exactly 1` and `hasChunk atLeast 1`.
        assert_eq!(report.status, ValidationStatus::Fail);
        assert!(report
            .violations
            .iter()
            .any(|v| v.property_name == TermId::from("onto:hasId")));
        assert!(report
            .violations
            .iter()
            .any(|v| v.property_name == TermId::from("onto:hasChunk")));
    }

    #[test]
    fn empty_model_is_a_programmer_error() {
        let graph = document_graph(true);
        let err = validate(&graph, &OntologyModel::new("empty")).unwrap_err();
        assert!(matches!(err, ValidateError::EmptyModel));
    }

    #[test]
    fn empty_subject_is_a_programmer_error() {
        let mut graph = FactGraph::new("d1");
        graph.push(Fact::new("", "onto:hasId", FactObject::string("x")));
        let err = validate(&graph, &document_model()).unwrap_err();
        assert!(matches!(err, ValidateError::MalformedGraph { index: 0 }));
    }

    #[test]
    fn repeated_calls_yield_byte_identical_reports() {
        let graph = document_graph(false);
        let model = document_model();
        let at = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let a = validate_at(&graph, &model, at).unwrap();
        let b = validate_at(&graph, &model, at).unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}
