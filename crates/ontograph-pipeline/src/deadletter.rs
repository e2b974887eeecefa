//! Dead-letter channel.
//!
//! Every terminal failure writes exactly one record here, carrying enough
//! context (failed stage, per-stage attempt counts, both branches' results
//! when the failure happened at the join) to diagnose and replay the
//! document without re-reading upstream logs.

use crate::commit::BranchReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::error;

/// The error half of a dead-letter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterError {
    pub kind: String,
    pub message: String,
}

/// Durable record of one terminally failed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub document_id: String,
    /// The document id unless the trigger supplied its own; re-driving a
    /// failed document reuses it, keeping re-drives idempotent.
    pub correlation_id: String,
    pub failed_stage: String,
    pub error: DeadLetterError,
    /// Attempt counts per stage at the time of failure.
    pub attempts: BTreeMap<String, u32>,
    /// Both branches' results when the failure happened at the join,
    /// including a branch that succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_results: Option<Vec<BranchReport>>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for dead-letter records.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn publish(&self, record: &DeadLetterRecord) -> std::io::Result<()>;
}

/// Appends one JSON line per record to a file.
pub struct FileDeadLetterSink {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileDeadLetterSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl DeadLetterSink for FileDeadLetterSink {
    async fn publish(&self, record: &DeadLetterRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;

        error!(
            document_id = %record.document_id,
            stage = %record.failed_stage,
            kind = %record.error.kind,
            "execution dead-lettered"
        );
        Ok(())
    }
}

/// Collects records in memory; the test suites' observation point.
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl MemoryDeadLetterSink {
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn publish(&self, record: &DeadLetterRecord) -> std::io::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc: &str) -> DeadLetterRecord {
        DeadLetterRecord {
            document_id: doc.into(),
            correlation_id: doc.into(),
            failed_stage: "graph-commit".into(),
            error: DeadLetterError {
                kind: "RetriesExhausted".into(),
                message: "graph-commit failed after 3 attempt(s)".into(),
            },
            attempts: BTreeMap::from([("graph-commit".to_string(), 3)]),
            branch_results: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead-letter.jsonl");
        let sink = FileDeadLetterSink::new(&path);

        sink.publish(&record("d1")).await.unwrap();
        sink.publish(&record("d2")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let restored: DeadLetterRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(restored.document_id, "d1");
        assert_eq!(restored.error.kind, "RetriesExhausted");
    }
}
