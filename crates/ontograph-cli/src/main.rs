//! Ontograph CLI
//!
//! Operator interface for the ingestion pipeline:
//! - `ingest`: run one parsed-document artifact through the full pipeline
//!   (generate → validate → parallel commit), locally or against real sinks
//! - `validate`: offline generate + validate, pretty-printed report
//! - `ontology-check`: well-formedness check of a schema document

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use ontograph_model::{validate, OntologyModel, ValidationReport, ValidationStatus};
use ontograph_pipeline::sinks::{HttpGraphSink, HttpVectorSink, MemoryGraphSink, MemoryVectorSink};
use ontograph_pipeline::{
    generate_facts, ExecutionOutcome, FileDeadLetterSink, FileSchemaStore, OntologyCache,
    Orchestrator, ParsedDocument, PipelineConfig, SchemaStore, SchemaStoreError, TriggerEvent,
};
use std::path::PathBuf;
use std::sync::Arc;

mod embeddings;

#[derive(Parser)]
#[command(name = "ontograph")]
#[command(
    author,
    version,
    about = "Ontograph: ontology-gated document ingestion pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one parsed-document artifact through the full pipeline
    Ingest(IngestArgs),
    /// Generate facts from an artifact and validate them, without committing
    Validate(ValidateArgs),
    /// Check a schema document for well-formedness
    OntologyCheck(OntologyCheckArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Parsed-document artifact (JSON)
    #[arg(long)]
    artifact: PathBuf,
    /// Ontology model document (JSON); defaults to the built-in document ontology
    #[arg(long)]
    ontology: Option<PathBuf>,
    /// Staging directory for bulk-load units
    #[arg(long, default_value = "staging")]
    staging_dir: PathBuf,
    /// Dead-letter file (JSON lines)
    #[arg(long, default_value = "dead-letter.jsonl")]
    dead_letter: PathBuf,
    /// Graph-store bulk loader endpoint; in-process sink when omitted
    #[arg(long)]
    graph_loader: Option<String>,
    /// Source URI prefix the loader resolves staged paths against
    #[arg(long, default_value = "file://")]
    source_base: String,
    /// Vector index endpoint; in-process sink when omitted
    #[arg(long)]
    vector_endpoint: Option<String>,
    /// Vector index name
    #[arg(long, default_value = "document-embeddings")]
    vector_index: String,
}

#[derive(Args)]
struct ValidateArgs {
    /// Parsed-document artifact (JSON)
    #[arg(long)]
    artifact: PathBuf,
    /// Ontology model document (JSON); defaults to the built-in document ontology
    #[arg(long)]
    ontology: Option<PathBuf>,
}

#[derive(Args)]
struct OntologyCheckArgs {
    /// Ontology model document (JSON)
    ontology: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => ingest(args).await,
        Commands::Validate(args) => validate_offline(args),
        Commands::OntologyCheck(args) => ontology_check(args),
    }
}

// ============================================================================
// ingest
// ============================================================================

async fn ingest(args: IngestArgs) -> Result<()> {
    let artifact = load_artifact(&args.artifact)?;
    let document_id = artifact.document_id.clone();

    let mut config = PipelineConfig::from_env();
    config.staging_dir = args.staging_dir.clone();

    let store: Arc<dyn SchemaStore> = match &args.ontology {
        Some(path) => Arc::new(FileSchemaStore::new(path)),
        None => Arc::new(BuiltinStore),
    };
    let cache = Arc::new(OntologyCache::new(store, config.ontology_ttl));

    let graph_sink: Arc<dyn ontograph_pipeline::GraphSink> = match &args.graph_loader {
        Some(endpoint) => Arc::new(
            HttpGraphSink::new(endpoint.clone(), args.source_base.clone())
                .map_err(|e| anyhow!("graph sink: {e}"))?,
        ),
        None => Arc::new(MemoryGraphSink::completing(0)),
    };
    let vector_sink: Arc<dyn ontograph_pipeline::VectorSink> = match &args.vector_endpoint {
        Some(endpoint) => Arc::new(
            HttpVectorSink::new(endpoint.clone(), args.vector_index.clone())
                .map_err(|e| anyhow!("vector sink: {e}"))?,
        ),
        None => Arc::new(MemoryVectorSink::default()),
    };
    let dead_letter = Arc::new(FileDeadLetterSink::new(&args.dead_letter));

    let orchestrator = Orchestrator::new(cache, graph_sink, vector_sink, dead_letter, config);

    let vectors = embeddings::hash_embeddings(&artifact.chunks);
    let outcome = orchestrator
        .execute(TriggerEvent::for_document(document_id.clone()), artifact, vectors)
        .await;

    match outcome {
        ExecutionOutcome::Succeeded {
            warnings,
            branch_reports,
            ..
        } => {
            println!("{} document {document_id}", "INGESTED".green().bold());
            for report in &branch_reports {
                println!("  {:?} branch: {:?}", report.branch, report.outcome);
            }
            if !warnings.is_empty() {
                println!("  {} {} schema warning(s):", "note:".yellow(), warnings.len());
                for warning in &warnings {
                    println!("    {}", warning.message.yellow());
                }
            }
            Ok(())
        }
        ExecutionOutcome::Failed(record) => {
            println!(
                "{} document {document_id} at stage {}: {}",
                "FAILED".red().bold(),
                record.failed_stage,
                record.error.message
            );
            println!(
                "  dead-letter record written to {}",
                args.dead_letter.display()
            );
            Err(anyhow!("ingestion failed: {}", record.error.kind))
        }
    }
}

/// Serves the built-in document ontology when no schema file is given.
struct BuiltinStore;

#[async_trait::async_trait]
impl SchemaStore for BuiltinStore {
    async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError> {
        Ok(ontograph_pipeline::document_ontology())
    }
}

// ============================================================================
// validate
// ============================================================================

fn validate_offline(args: ValidateArgs) -> Result<()> {
    let artifact = load_artifact(&args.artifact)?;
    let model = load_model(args.ontology.as_deref())?;

    let graph = generate_facts(&artifact, chrono::Utc::now());
    let report = validate(&graph, &model)?;
    print_report(&report);

    if report.accepted() {
        Ok(())
    } else {
        Err(anyhow!("validation failed"))
    }
}

fn print_report(report: &ValidationReport) {
    let status = match report.status {
        ValidationStatus::Pass => "PASS".green().bold(),
        ValidationStatus::Warn => "WARN".yellow().bold(),
        ValidationStatus::Fail => "FAIL".red().bold(),
    };
    println!(
        "{status}: {} subject(s), {} fact(s) checked",
        report.subjects_validated, report.facts_validated
    );
    for violation in &report.violations {
        println!(
            "  {} [{:?}] {}",
            "violation".red(),
            violation.kind,
            violation.message
        );
    }
    for warning in &report.warnings {
        println!(
            "  {} [{:?}] {}",
            "warning".yellow(),
            warning.kind,
            warning.message
        );
    }
}

// ============================================================================
// ontology-check
// ============================================================================

fn ontology_check(args: OntologyCheckArgs) -> Result<()> {
    let model = load_model(Some(args.ontology.as_path()))?;
    match model.check() {
        Ok(()) => {
            println!("{} {}", "OK".green().bold(), model.version);
            for (kind, count) in model.summary() {
                println!("  {count} {kind}");
            }
            Ok(())
        }
        Err(errors) => {
            println!("{} {}", "MALFORMED".red().bold(), model.version);
            for error in &errors {
                println!("  {}", error.to_string().red());
            }
            Err(anyhow!("{} model error(s)", errors.len()))
        }
    }
}

// ============================================================================
// Loading helpers
// ============================================================================

fn load_artifact(path: &std::path::Path) -> Result<ParsedDocument> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading artifact {}", path.display()))?;
    ParsedDocument::from_json(&json)
        .with_context(|| format!("parsing artifact {}", path.display()))
}

fn load_model(path: Option<&std::path::Path>) -> Result<OntologyModel> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading ontology {}", path.display()))?;
            OntologyModel::from_json(&json)
                .with_context(|| format!("parsing ontology {}", path.display()))
        }
        None => Ok(ontograph_pipeline::document_ontology()),
    }
}
