//! Ontology model: the published schema that fact graphs must conform to.
//!
//! The model is a versioned document of class definitions (with multiple
//! inheritance), property definitions (relational or literal-valued, with
//! declared domain/range and query-time characteristics), and cardinality
//! restrictions attached to classes. It is loaded from a schema store as
//! JSON, indexed once, and then shared read-only with the validator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// Identifier of a class or property in the ontology namespace.
///
/// Term ids are IRI-shaped strings (`onto:Document`, `onto:hasChunk`);
/// the model never interprets them beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub String);

impl TermId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TermId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TermId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Schema declarations
// ============================================================================

/// A class declaration. Multiple parents are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: TermId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<TermId>,
}

impl ClassDef {
    pub fn new(id: impl Into<TermId>) -> Self {
        Self {
            id: id.into(),
            label: None,
            parents: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<TermId>) -> Self {
        self.parents.push(parent.into());
        self
    }
}

/// Whether a property links two entities or attaches a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Relational,
    Literal,
}

/// Scalar types a literal-valued property may range over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Integer,
    Decimal,
    Timestamp,
}

/// Declared range of a property: a class (relational) or a scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RangeDecl {
    Class { class: TermId },
    Scalar { scalar: ScalarType },
}

/// A property declaration.
///
/// `symmetric` and `inverse_of` are query-time metadata: they describe how
/// the graph may be traversed, and the validator neither enforces them nor
/// materializes inverse facts at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub id: TermId,
    pub kind: PropertyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<TermId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeDecl>,
    #[serde(default)]
    pub symmetric: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_of: Option<TermId>,
}

impl PropertyDef {
    pub fn relational(id: impl Into<TermId>) -> Self {
        Self {
            id: id.into(),
            kind: PropertyKind::Relational,
            domain: None,
            range: None,
            symmetric: false,
            inverse_of: None,
        }
    }

    pub fn literal(id: impl Into<TermId>, scalar: ScalarType) -> Self {
        Self {
            id: id.into(),
            kind: PropertyKind::Literal,
            domain: None,
            range: Some(RangeDecl::Scalar { scalar }),
            symmetric: false,
            inverse_of: None,
        }
    }

    pub fn with_domain(mut self, class: impl Into<TermId>) -> Self {
        self.domain = Some(class.into());
        self
    }

    pub fn with_range_class(mut self, class: impl Into<TermId>) -> Self {
        self.range = Some(RangeDecl::Class {
            class: class.into(),
        });
        self
    }

    pub fn with_inverse(mut self, prop: impl Into<TermId>) -> Self {
        self.inverse_of = Some(prop.into());
        self
    }

    pub fn symmetric(mut self) -> Self {
        self.symmetric = true;
        self
    }
}

/// Cardinality rule carried by a restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "n", rename_all = "snake_case")]
pub enum Cardinality {
    Exactly(u32),
    AtLeast(u32),
    AtMost(u32),
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::Exactly(n) => write!(f, "exactly {n}"),
            Cardinality::AtLeast(n) => write!(f, "at least {n}"),
            Cardinality::AtMost(n) => write!(f, "at most {n}"),
        }
    }
}

/// A cardinality restriction attached to a class for one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub on_class: TermId,
    pub property: TermId,
    pub cardinality: Cardinality,
}

// ============================================================================
// Model
// ============================================================================

/// The versioned schema document, with lookup indexes built at load time.
///
/// Index maps are derived state and excluded from serialization; they are
/// rebuilt whenever a model is deserialized or mutated through the builder
/// methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyModel {
    pub version: String,
    pub classes: Vec<ClassDef>,
    pub properties: Vec<PropertyDef>,
    pub restrictions: Vec<Restriction>,

    #[serde(skip)]
    class_index: HashMap<TermId, usize>,
    #[serde(skip)]
    property_index: HashMap<TermId, usize>,
    #[serde(skip)]
    restrictions_by_class: HashMap<TermId, Vec<usize>>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate class definition: {0}")]
    DuplicateClass(TermId),
    #[error("duplicate property definition: {0}")]
    DuplicateProperty(TermId),
    #[error("restriction on {class} references undeclared property {property}")]
    RestrictionUnknownProperty { class: TermId, property: TermId },
    #[error(
        "restriction on {class} for {property}: class is not in the property's declared domain {domain}"
    )]
    RestrictionOutsideDomain {
        class: TermId,
        property: TermId,
        domain: TermId,
    },
    #[error("class {class} names unknown parent {parent}")]
    UnknownParent { class: TermId, parent: TermId },
}

impl OntologyModel {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            classes: Vec::new(),
            properties: Vec::new(),
            restrictions: Vec::new(),
            class_index: HashMap::new(),
            property_index: HashMap::new(),
            restrictions_by_class: HashMap::new(),
        }
    }

    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self.reindex();
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self.reindex();
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self.reindex();
        self
    }

    /// Rebuild the lookup indexes. Must be called after deserialization;
    /// `from_json` does this for you.
    pub fn reindex(&mut self) {
        self.class_index = self
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        self.property_index = self
            .properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        self.restrictions_by_class = HashMap::new();
        for (i, r) in self.restrictions.iter().enumerate() {
            self.restrictions_by_class
                .entry(r.on_class.clone())
                .or_default()
                .push(i);
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut model: OntologyModel = serde_json::from_str(json)?;
        model.reindex();
        Ok(model)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.properties.is_empty()
    }

    pub fn class(&self, id: &TermId) -> Option<&ClassDef> {
        self.class_index.get(id).map(|&i| &self.classes[i])
    }

    pub fn property(&self, id: &TermId) -> Option<&PropertyDef> {
        self.property_index.get(id).map(|&i| &self.properties[i])
    }

    /// Restrictions attached directly to `class`, in declaration order.
    pub fn restrictions_of(&self, class: &TermId) -> impl Iterator<Item = &Restriction> {
        self.restrictions_by_class
            .get(class)
            .into_iter()
            .flatten()
            .map(|&i| &self.restrictions[i])
    }

    /// Transitive closure of ancestor classes, excluding `class` itself.
    ///
    /// Cycle-safe: a malformed hierarchy terminates instead of recursing.
    pub fn ancestors(&self, class: &TermId) -> BTreeSet<TermId> {
        let mut out = BTreeSet::new();
        let mut stack: Vec<TermId> = match self.class(class) {
            Some(c) => c.parents.clone(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            if !out.insert(next.clone()) {
                continue;
            }
            if let Some(c) = self.class(&next) {
                stack.extend(c.parents.iter().cloned());
            }
        }
        out
    }

    /// `sub == sup` or `sup` is a transitive ancestor of `sub`.
    pub fn is_subclass_of(&self, sub: &TermId, sup: &TermId) -> bool {
        sub == sup || self.ancestors(sub).contains(sup)
    }

    /// Well-formedness check: restriction properties must be declared, and
    /// the owning class (or an ancestor) must sit in the property's domain;
    /// parent references must resolve.
    pub fn check(&self) -> Result<(), Vec<ModelError>> {
        let mut errors = Vec::new();

        let mut seen = BTreeSet::new();
        for class in &self.classes {
            if !seen.insert(class.id.clone()) {
                errors.push(ModelError::DuplicateClass(class.id.clone()));
            }
            for parent in &class.parents {
                if self.class(parent).is_none() {
                    errors.push(ModelError::UnknownParent {
                        class: class.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let mut seen = BTreeSet::new();
        for prop in &self.properties {
            if !seen.insert(prop.id.clone()) {
                errors.push(ModelError::DuplicateProperty(prop.id.clone()));
            }
        }

        for restriction in &self.restrictions {
            let Some(prop) = self.property(&restriction.property) else {
                errors.push(ModelError::RestrictionUnknownProperty {
                    class: restriction.on_class.clone(),
                    property: restriction.property.clone(),
                });
                continue;
            };
            if let Some(domain) = &prop.domain {
                // The owning class must be the domain class or a descendant
                // of it; otherwise the restriction can never be satisfied.
                if !self.is_subclass_of(&restriction.on_class, domain) {
                    errors.push(ModelError::RestrictionOutsideDomain {
                        class: restriction.on_class.clone(),
                        property: restriction.property.clone(),
                        domain: domain.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Summary counts keyed by kind, for CLI/diagnostic output.
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut out = BTreeMap::new();
        out.insert("classes", self.classes.len());
        out.insert("properties", self.properties.len());
        out.insert("restrictions", self.restrictions.len());
        out
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond_model() -> OntologyModel {
        OntologyModel::new("test-1")
            .with_class(ClassDef::new("onto:Thing"))
            .with_class(ClassDef::new("onto:Agent").with_parent("onto:Thing"))
            .with_class(ClassDef::new("onto:Resource").with_parent("onto:Thing"))
            .with_class(
                ClassDef::new("onto:Person")
                    .with_parent("onto:Agent")
                    .with_parent("onto:Resource"),
            )
    }

    #[test]
    fn ancestors_follow_multiple_parents() {
        let model = diamond_model();
        let ancestors = model.ancestors(&TermId::from("onto:Person"));
        assert!(ancestors.contains(&TermId::from("onto:Agent")));
        assert!(ancestors.contains(&TermId::from("onto:Resource")));
        assert!(ancestors.contains(&TermId::from("onto:Thing")));
        assert!(!ancestors.contains(&TermId::from("onto:Person")));
    }

    #[test]
    fn ancestors_terminate_on_cycles() {
        let model = OntologyModel::new("cyclic")
            .with_class(ClassDef::new("onto:A").with_parent("onto:B"))
            .with_class(ClassDef::new("onto:B").with_parent("onto:A"));
        let ancestors = model.ancestors(&TermId::from("onto:A"));
        assert!(ancestors.contains(&TermId::from("onto:B")));
        assert!(ancestors.contains(&TermId::from("onto:A")));
    }

    #[test]
    fn subclass_is_reflexive_and_transitive() {
        let model = diamond_model();
        let person = TermId::from("onto:Person");
        assert!(model.is_subclass_of(&person, &person));
        assert!(model.is_subclass_of(&person, &TermId::from("onto:Thing")));
        assert!(!model.is_subclass_of(&TermId::from("onto:Thing"), &person));
    }

    #[test]
    fn check_rejects_restriction_outside_domain() {
        let model = OntologyModel::new("bad")
            .with_class(ClassDef::new("onto:Document"))
            .with_class(ClassDef::new("onto:Keyword"))
            .with_property(
                PropertyDef::literal("onto:hasName", ScalarType::String)
                    .with_domain("onto:Keyword"),
            )
            .with_restriction(Restriction {
                on_class: TermId::from("onto:Document"),
                property: TermId::from("onto:hasName"),
                cardinality: Cardinality::Exactly(1),
            });
        let errors = model.check().unwrap_err();
        assert!(matches!(
            errors[0],
            ModelError::RestrictionOutsideDomain { .. }
        ));
    }

    #[test]
    fn check_accepts_restriction_via_ancestor_domain() {
        // Restriction sits on a subclass of the property's declared domain.
        let model = OntologyModel::new("ok")
            .with_class(ClassDef::new("onto:Resource"))
            .with_class(ClassDef::new("onto:Document").with_parent("onto:Resource"))
            .with_property(
                PropertyDef::literal("onto:hasId", ScalarType::String)
                    .with_domain("onto:Resource"),
            )
            .with_restriction(Restriction {
                on_class: TermId::from("onto:Document"),
                property: TermId::from("onto:hasId"),
                cardinality: Cardinality::Exactly(1),
            });
        assert!(model.check().is_ok());
    }

    #[test]
    fn json_roundtrip_rebuilds_indexes() {
        let model = diamond_model();
        let json = serde_json::to_string(&model).unwrap();
        let restored = OntologyModel::from_json(&json).unwrap();
        assert!(restored.class(&TermId::from("onto:Person")).is_some());
        assert_eq!(
            restored.ancestors(&TermId::from("onto:Person")),
            model.ancestors(&TermId::from("onto:Person"))
        );
    }
}
