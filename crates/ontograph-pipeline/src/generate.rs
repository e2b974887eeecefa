//! Fact generation: parsed-document artifacts in, fact graph out.
//!
//! The artifact is produced by an external parsing collaborator; its JSON
//! shape is part of the pipeline's public contract. Generation is
//! deterministic given the artifact and a timestamp: the same document
//! always yields the same graph, which keeps staged units content-addressed
//! and re-drives idempotent.

use crate::commit::VectorRecord;
use chrono::{DateTime, Utc};
use ontograph_model::{
    Cardinality, ClassDef, Fact, FactGraph, FactObject, OntologyModel, PropertyDef, Restriction,
    ScalarType, TermId,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ============================================================================
// Input artifact
// ============================================================================

/// One text chunk of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub chunk_id: u32,
    pub text: String,
    #[serde(default)]
    pub start_offset: u64,
    #[serde(default)]
    pub length: u64,
}

/// Document-level metadata carried by the artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Comma-separated keyword list, as the upstream parser emits it.
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// The parsed-document artifact consumed by the Generating stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDocument {
    pub document_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl ParsedDocument {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Fact generation
// ============================================================================

/// Longest chunk text stored as a graph literal; the full text lives in the
/// vector index, the graph keeps a preview.
const CHUNK_TEXT_LIMIT: usize = 500;

/// Cap on naive entity mentions extracted per chunk.
const MAX_ENTITIES_PER_CHUNK: usize = 5;

fn entity_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("static pattern"))
}

/// Build the fact graph for one parsed document.
pub fn generate_facts(artifact: &ParsedDocument, generated_at: DateTime<Utc>) -> FactGraph {
    let mut graph = FactGraph::new(artifact.document_id.clone());
    let doc_uri = format!("doc:{}", artifact.document_id);

    graph.push(Fact::typed(doc_uri.as_str(), "onto:Document"));
    graph.push(Fact::new(
        doc_uri.as_str(),
        "onto:hasId",
        FactObject::string(artifact.document_id.clone()),
    ));
    graph.push(Fact::new(
        doc_uri.as_str(),
        "onto:hasFileName",
        FactObject::string(artifact.file_name.clone().unwrap_or_else(|| "unknown".into())),
    ));
    graph.push(Fact::new(
        doc_uri.as_str(),
        "onto:hasTextLength",
        FactObject::integer(artifact.extracted_text.len() as i64),
    ));
    graph.push(Fact::new(
        doc_uri.as_str(),
        "onto:createdAt",
        FactObject::timestamp(generated_at),
    ));

    if let Some(keywords) = &artifact.metadata.keywords {
        for keyword in keywords.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let keyword_uri = format!("entity:{}", encode_segment(keyword));
            graph.push(Fact::typed(keyword_uri.as_str(), "onto:Keyword"));
            graph.push(Fact::new(
                keyword_uri.as_str(),
                "onto:hasValue",
                FactObject::string(keyword),
            ));
            graph.push(Fact::new(
                doc_uri.as_str(),
                "onto:hasKeyword",
                FactObject::entity(keyword_uri.as_str()),
            ));
        }
    }

    if let Some(document_type) = &artifact.metadata.document_type {
        graph.push(Fact::new(
            doc_uri.as_str(),
            "onto:hasType",
            FactObject::string(document_type.clone()),
        ));
    }

    if let Some(author) = &artifact.metadata.author {
        let author_uri = format!("entity:{}", encode_segment(author));
        graph.push(Fact::typed(author_uri.as_str(), "onto:Author"));
        graph.push(Fact::new(
            author_uri.as_str(),
            "onto:hasName",
            FactObject::string(author.clone()),
        ));
        graph.push(Fact::new(
            doc_uri.as_str(),
            "onto:hasAuthor",
            FactObject::entity(author_uri.as_str()),
        ));
    }

    for chunk in &artifact.chunks {
        let chunk_uri = format!("{doc_uri}/chunk/{}", chunk.chunk_id);
        graph.push(Fact::typed(chunk_uri.as_str(), "onto:TextChunk"));
        graph.push(Fact::new(
            chunk_uri.as_str(),
            "onto:hasChunkId",
            FactObject::integer(chunk.chunk_id as i64),
        ));
        let preview: String = chunk.text.chars().take(CHUNK_TEXT_LIMIT).collect();
        graph.push(Fact::new(
            chunk_uri.as_str(),
            "onto:hasText",
            FactObject::string(preview),
        ));
        graph.push(Fact::new(
            chunk_uri.as_str(),
            "onto:hasStartPosition",
            FactObject::integer(chunk.start_offset as i64),
        ));
        graph.push(Fact::new(
            chunk_uri.as_str(),
            "onto:hasLength",
            FactObject::integer(chunk.length as i64),
        ));
        graph.push(Fact::new(
            doc_uri.as_str(),
            "onto:hasChunk",
            FactObject::entity(chunk_uri.as_str()),
        ));

        for entity in extract_entities(&chunk.text) {
            let entity_uri = format!("entity:{}", encode_segment(&entity));
            graph.push(Fact::typed(entity_uri.as_str(), "onto:Entity"));
            graph.push(Fact::new(
                entity_uri.as_str(),
                "onto:hasValue",
                FactObject::string(entity),
            ));
            graph.push(Fact::new(
                chunk_uri.as_str(),
                "onto:mentions",
                FactObject::entity(entity_uri.as_str()),
            ));
        }
    }

    graph
}

/// Naive mention extraction: the first few distinct capitalized words of
/// four letters or more. A stand-in for real NER, which stays external.
fn extract_entities(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in entity_word_pattern().find_iter(text) {
        let word = m.as_str();
        if word.len() <= 3 || out.iter().any(|w| w == word) {
            continue;
        }
        out.push(word.to_string());
        if out.len() >= MAX_ENTITIES_PER_CHUNK {
            break;
        }
    }
    out
}

/// Percent-encode an arbitrary string into a single IRI path segment.
fn encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// ============================================================================
// Vector record derivation
// ============================================================================

/// Pair each chunk with its externally computed embedding vector.
///
/// Record ids are `<documentId>-<chunkId>`, the stable key the vector index
/// upserts by; a retried batch overwrites rather than duplicates. Chunks
/// without a matching vector are skipped.
pub fn derive_vector_records(
    artifact: &ParsedDocument,
    embeddings: &BTreeMap<u32, Vec<f32>>,
) -> Vec<VectorRecord> {
    let mut metadata = BTreeMap::new();
    if let Some(file_name) = &artifact.file_name {
        metadata.insert("fileName".to_string(), file_name.clone());
    }
    if let Some(document_type) = &artifact.metadata.document_type {
        metadata.insert("documentType".to_string(), document_type.clone());
    }
    if let Some(author) = &artifact.metadata.author {
        metadata.insert("author".to_string(), author.clone());
    }

    artifact
        .chunks
        .iter()
        .filter_map(|chunk| {
            let vector = embeddings.get(&chunk.chunk_id)?.clone();
            let mut metadata = metadata.clone();
            metadata.insert("documentId".to_string(), artifact.document_id.clone());
            Some(VectorRecord {
                id: format!("{}-{}", artifact.document_id, chunk.chunk_id),
                vector,
                text: chunk.text.clone(),
                metadata,
            })
        })
        .collect()
}

// ============================================================================
// Default document ontology
// ============================================================================

/// The ontology the pipeline publishes for document graphs.
pub fn document_ontology() -> OntologyModel {
    let restriction = |class: &str, property: &str, cardinality: Cardinality| Restriction {
        on_class: TermId::from(class),
        property: TermId::from(property),
        cardinality,
    };

    OntologyModel::new("document-ontology/1.0")
        .with_class(ClassDef::new("onto:Document").with_label("Source document"))
        .with_class(ClassDef::new("onto:TextChunk").with_label("Text chunk"))
        .with_class(ClassDef::new("onto:Keyword").with_label("Keyword"))
        .with_class(ClassDef::new("onto:Author").with_label("Author"))
        .with_class(ClassDef::new("onto:Entity").with_label("Mentioned entity"))
        .with_class(ClassDef::new("onto:Embedding").with_label("Embedding vector"))
        .with_property(
            PropertyDef::literal("onto:hasId", ScalarType::String).with_domain("onto:Document"),
        )
        .with_property(
            PropertyDef::literal("onto:hasFileName", ScalarType::String)
                .with_domain("onto:Document"),
        )
        .with_property(
            PropertyDef::literal("onto:hasTextLength", ScalarType::Integer)
                .with_domain("onto:Document"),
        )
        .with_property(
            PropertyDef::literal("onto:createdAt", ScalarType::Timestamp)
                .with_domain("onto:Document"),
        )
        .with_property(
            PropertyDef::literal("onto:hasType", ScalarType::String).with_domain("onto:Document"),
        )
        .with_property(
            PropertyDef::relational("onto:hasChunk")
                .with_domain("onto:Document")
                .with_range_class("onto:TextChunk")
                .with_inverse("onto:partOf"),
        )
        .with_property(
            PropertyDef::relational("onto:partOf")
                .with_domain("onto:TextChunk")
                .with_range_class("onto:Document")
                .with_inverse("onto:hasChunk"),
        )
        .with_property(
            PropertyDef::relational("onto:hasKeyword")
                .with_domain("onto:Document")
                .with_range_class("onto:Keyword"),
        )
        .with_property(
            PropertyDef::relational("onto:hasAuthor")
                .with_domain("onto:Document")
                .with_range_class("onto:Author"),
        )
        .with_property(
            PropertyDef::literal("onto:hasChunkId", ScalarType::Integer)
                .with_domain("onto:TextChunk"),
        )
        .with_property(
            PropertyDef::literal("onto:hasText", ScalarType::String).with_domain("onto:TextChunk"),
        )
        .with_property(
            PropertyDef::literal("onto:hasStartPosition", ScalarType::Integer)
                .with_domain("onto:TextChunk"),
        )
        .with_property(
            PropertyDef::literal("onto:hasLength", ScalarType::Integer)
                .with_domain("onto:TextChunk"),
        )
        .with_property(
            PropertyDef::relational("onto:hasEmbedding")
                .with_domain("onto:TextChunk")
                .with_range_class("onto:Embedding"),
        )
        .with_property(
            PropertyDef::relational("onto:mentions")
                .with_domain("onto:TextChunk")
                .with_range_class("onto:Entity"),
        )
        .with_property(PropertyDef::literal("onto:hasValue", ScalarType::String))
        .with_property(PropertyDef::literal("onto:hasName", ScalarType::String))
        .with_restriction(restriction("onto:Document", "onto:hasId", Cardinality::Exactly(1)))
        .with_restriction(restriction(
            "onto:Document",
            "onto:hasFileName",
            Cardinality::Exactly(1),
        ))
        .with_restriction(restriction(
            "onto:Document",
            "onto:createdAt",
            Cardinality::Exactly(1),
        ))
        .with_restriction(restriction(
            "onto:Document",
            "onto:hasChunk",
            Cardinality::AtLeast(1),
        ))
        .with_restriction(restriction(
            "onto:TextChunk",
            "onto:hasEmbedding",
            Cardinality::AtMost(1),
        ))
}

// ============================================================================
// Tests
// ============================================================================
