//! Staging serializers: Turtle and N-Triples emission for the graph-store
//! bulk loader.
//!
//! Emit-only. The bulk loader consumes one staged file per document; output
//! is deterministic for a fixed graph (subjects sorted, facts grouped per
//! subject in graph order) so staged units are content-addressable.

use crate::graph::{EntityId, FactGraph, FactObject, LiteralValue};
use crate::ontology::TermId;
use chrono::SecondsFormat;
use std::fmt::Write;

pub const NAMESPACE_BASE: &str = "http://ontograph.example.com/";
pub const NAMESPACE_DOC: &str = "http://ontograph.example.com/document/";
pub const NAMESPACE_ENTITY: &str = "http://ontograph.example.com/entity/";
pub const NAMESPACE_ONTO: &str = "http://ontograph.example.com/ontology/";

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// Serialize the graph as prefixed Turtle, one subject block per entity.
pub fn to_turtle(graph: &FactGraph) -> String {
    let mut out = String::new();
    out.push_str("@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .\n");
    out.push_str("@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .\n");
    let _ = writeln!(out, "@prefix doc: <{NAMESPACE_DOC}> .");
    let _ = writeln!(out, "@prefix entity: <{NAMESPACE_ENTITY}> .");
    let _ = writeln!(out, "@prefix onto: <{NAMESPACE_ONTO}> .");
    out.push('\n');

    // subjects() sorts; keep each subject's facts in graph order.
    for (subject, _) in graph.subjects() {
        let facts: Vec<_> = graph.facts.iter().filter(|f| f.subject == subject).collect();
        let _ = writeln!(out, "{}", entity_term(&subject));
        for (i, fact) in facts.iter().enumerate() {
            let sep = if i + 1 == facts.len() { '.' } else { ';' };
            let _ = writeln!(
                out,
                "    {} {} {sep}",
                predicate_term(&fact.property),
                object_term(&fact.object),
            );
        }
        out.push('\n');
    }
    out
}

/// Serialize the graph as N-Triples (one absolute-IRI triple per line).
pub fn to_ntriples(graph: &FactGraph) -> String {
    let mut out = String::new();
    for fact in &graph.facts {
        let _ = writeln!(
            out,
            "{} {} {} .",
            full_iri(fact.subject.as_str()),
            full_iri(fact.property.as_str()),
            object_term_full(&fact.object),
        );
    }
    out
}

/// Escape special characters in a literal per Turtle/N-Triples rules.
pub fn escape_literal(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn entity_term(id: &EntityId) -> String {
    prefixed_or_bracketed(id.as_str())
}

fn predicate_term(property: &TermId) -> String {
    prefixed_or_bracketed(property.as_str())
}

fn prefixed_or_bracketed(iri: &str) -> String {
    if iri.starts_with("rdf:")
        || iri.starts_with("xsd:")
        || iri.starts_with("doc:")
        || iri.starts_with("entity:")
        || iri.starts_with("onto:")
    {
        return iri.to_string();
    }
    if let Some(rest) = iri.strip_prefix(NAMESPACE_DOC) {
        return format!("doc:{rest}");
    }
    if let Some(rest) = iri.strip_prefix(NAMESPACE_ENTITY) {
        return format!("entity:{rest}");
    }
    if let Some(rest) = iri.strip_prefix(NAMESPACE_ONTO) {
        return format!("onto:{rest}");
    }
    format!("<{iri}>")
}

fn object_term(object: &FactObject) -> String {
    match object {
        FactObject::Entity(id) => prefixed_or_bracketed(id.as_str()),
        FactObject::Literal(lit) => literal_term(lit),
    }
}

fn literal_term(lit: &LiteralValue) -> String {
    match lit {
        LiteralValue::String(s) => format!("\"{}\"", escape_literal(s)),
        LiteralValue::Integer(i) => format!("\"{i}\"^^xsd:integer"),
        LiteralValue::Decimal(d) => format!("\"{d}\"^^xsd:decimal"),
        LiteralValue::Timestamp(t) => format!(
            "\"{}\"^^xsd:dateTime",
            t.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
    }
}

/// Expand a possibly-prefixed IRI to its absolute `<...>` form.
fn full_iri(iri: &str) -> String {
    if let Some(rest) = iri.strip_prefix("rdf:") {
        return format!("<{RDF_NS}{rest}>");
    }
    if let Some(rest) = iri.strip_prefix("xsd:") {
        return format!("<{XSD_NS}{rest}>");
    }
    if let Some(rest) = iri.strip_prefix("doc:") {
        return format!("<{NAMESPACE_DOC}{rest}>");
    }
    if let Some(rest) = iri.strip_prefix("entity:") {
        return format!("<{NAMESPACE_ENTITY}{rest}>");
    }
    if let Some(rest) = iri.strip_prefix("onto:") {
        return format!("<{NAMESPACE_ONTO}{rest}>");
    }
    format!("<{iri}>")
}

fn object_term_full(object: &FactObject) -> String {
    match object {
        FactObject::Entity(id) => full_iri(id.as_str()),
        FactObject::Literal(lit) => match lit {
            LiteralValue::String(s) => format!("\"{}\"", escape_literal(s)),
            LiteralValue::Integer(i) => format!("\"{i}\"^^<{XSD_NS}integer>"),
            LiteralValue::Decimal(d) => format!("\"{d}\"^^<{XSD_NS}decimal>"),
            LiteralValue::Timestamp(t) => format!(
                "\"{}\"^^<{XSD_NS}dateTime>",
                t.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
