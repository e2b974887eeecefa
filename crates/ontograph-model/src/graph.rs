//! Fact graph: the set of subject-property-object facts derived from one
//! source document.
//!
//! A fact's object is either a reference to another entity or a typed
//! literal. Subjects declare class membership through the reserved type
//! property; everything else about a subject is ordinary facts. One graph
//! never mixes facts from more than one document; the pipeline commits
//! per-document units and relies on that.

use crate::ontology::TermId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved property that declares class membership.
pub const TYPE_PROPERTY: &str = "rdf:type";

/// Identifier of an entity (subject or entity-valued object). IRI-shaped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A typed literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Timestamp(DateTime<Utc>),
}

impl LiteralValue {
    /// Lexical form used in staging output and messages.
    pub fn lexical(&self) -> String {
        match self {
            LiteralValue::String(s) => s.clone(),
            LiteralValue::Integer(i) => i.to_string(),
            LiteralValue::Decimal(d) => d.to_string(),
            LiteralValue::Timestamp(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Object position of a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactObject {
    Entity(EntityId),
    Literal(LiteralValue),
}

impl FactObject {
    pub fn entity(id: impl Into<EntityId>) -> Self {
        FactObject::Entity(id.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        FactObject::Literal(LiteralValue::String(s.into()))
    }

    pub fn integer(i: i64) -> Self {
        FactObject::Literal(LiteralValue::Integer(i))
    }

    pub fn timestamp(t: DateTime<Utc>) -> Self {
        FactObject::Literal(LiteralValue::Timestamp(t))
    }

    pub fn as_entity(&self) -> Option<&EntityId> {
        match self {
            FactObject::Entity(id) => Some(id),
            FactObject::Literal(_) => None,
        }
    }
}

/// One subject-property-object record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub subject: EntityId,
    pub property: TermId,
    pub object: FactObject,
}

impl Fact {
    pub fn new(
        subject: impl Into<EntityId>,
        property: impl Into<TermId>,
        object: FactObject,
    ) -> Self {
        Self {
            subject: subject.into(),
            property: property.into(),
            object,
        }
    }

    /// Class-membership fact via the reserved type property.
    pub fn typed(subject: impl Into<EntityId>, class: impl Into<TermId>) -> Self {
        let class = class.into();
        Self {
            subject: subject.into(),
            property: TermId::new(TYPE_PROPERTY),
            object: FactObject::Entity(EntityId::new(class.0)),
        }
    }

    pub fn is_type_fact(&self) -> bool {
        self.property.as_str() == TYPE_PROPERTY
    }
}

/// All facts derived from one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactGraph {
    pub document_id: String,
    pub facts: Vec<Fact>,
}

/// One subject's facts, split into declared classes and property values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectFacts {
    /// Classes declared through the type property, in first-seen order.
    pub types: Vec<TermId>,
    /// Non-type facts grouped by property, preserving fact order.
    pub properties: BTreeMap<TermId, Vec<FactObject>>,
}

impl FactGraph {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            facts: Vec::new(),
        }
    }

    pub fn push(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Group facts by subject. Subjects come out in sorted order so every
    /// downstream consumer (validator, serializer) is deterministic.
    pub fn subjects(&self) -> BTreeMap<EntityId, SubjectFacts> {
        let mut out: BTreeMap<EntityId, SubjectFacts> = BTreeMap::new();
        for fact in &self.facts {
            let entry = out.entry(fact.subject.clone()).or_default();
            if fact.is_type_fact() {
                if let FactObject::Entity(class) = &fact.object {
                    let class = TermId::new(class.0.clone());
                    if !entry.types.contains(&class) {
                        entry.types.push(class);
                    }
                }
            } else {
                entry
                    .properties
                    .entry(fact.property.clone())
                    .or_default()
                    .push(fact.object.clone());
            }
        }
        out
    }

    /// Distinct classes referenced by type facts, sorted.
    pub fn referenced_classes(&self) -> Vec<TermId> {
        let mut classes: Vec<TermId> = self
            .facts
            .iter()
            .filter(|f| f.is_type_fact())
            .filter_map(|f| f.object.as_entity())
            .map(|e| TermId::new(e.0.clone()))
            .collect();
        classes.sort();
        classes.dedup();
        classes
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_split_types_from_properties() {
        let mut graph = FactGraph::new("doc-1");
        graph.push(Fact::typed("doc:1", "onto:Document"));
        graph.push(Fact::new("doc:1", "onto:hasId", FactObject::string("doc-1")));
        graph.push(Fact::new(
            "doc:1",
            "onto:hasChunk",
            FactObject::entity("doc:1/chunk/0"),
        ));

        let subjects = graph.subjects();
        let doc = &subjects[&EntityId::from("doc:1")];
        assert_eq!(doc.types, vec![TermId::from("onto:Document")]);
        assert_eq!(doc.properties.len(), 2);
        assert_eq!(doc.properties[&TermId::from("onto:hasChunk")].len(), 1);
    }

    #[test]
    fn duplicate_type_facts_collapse() {
        let mut graph = FactGraph::new("doc-1");
        graph.push(Fact::typed("doc:1", "onto:Document"));
        graph.push(Fact::typed("doc:1", "onto:Document"));
        let subjects = graph.subjects();
        assert_eq!(subjects[&EntityId::from("doc:1")].types.len(), 1);
    }

    #[test]
    fn repeated_property_values_are_counted_separately() {
        let mut graph = FactGraph::new("doc-1");
        graph.push(Fact::new(
            "chunk:0",
            "onto:hasEmbedding",
            FactObject::entity("emb:a"),
        ));
        graph.push(Fact::new(
            "chunk:0",
            "onto:hasEmbedding",
            FactObject::entity("emb:b"),
        ));
        let subjects = graph.subjects();
        assert_eq!(
            subjects[&EntityId::from("chunk:0")].properties[&TermId::from("onto:hasEmbedding")]
                .len(),
            2
        );
    }
}
