//! HTTP sink adapters.
//!
//! `HttpGraphSink` speaks the bulk-loader protocol of the graph store:
//! `POST <endpoint>` submits a load referencing the staged unit and returns
//! a load id; `GET <endpoint>/<id>` reports overall load status. The status
//! strings follow the loader's vocabulary (`LOAD_IN_PROGRESS`,
//! `LOAD_COMPLETED`, `LOAD_FAILED`, ...).
//!
//! `HttpVectorSink` speaks the bulk-upsert protocol of the vector index:
//! an ND-JSON body alternating index-action lines and documents, keyed by
//! record id so resubmission overwrites.

use crate::commit::{GraphSink, LoadId, LoadStatus, StagedGraph, VectorRecord, VectorSink};
use crate::error::SinkError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client(timeout: Duration) -> Result<reqwest::Client, SinkError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SinkError::Protocol(e.to_string()))
}

// ============================================================================
// Graph store bulk loader
// ============================================================================

pub struct HttpGraphSink {
    client: reqwest::Client,
    loader_endpoint: String,
    /// Prefix prepended to the staged path to form the loader-visible source
    /// URI (e.g. a bucket or shared-volume root).
    source_base: String,
}

#[derive(Deserialize)]
struct LoaderResponse {
    payload: LoaderPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoaderPayload {
    #[serde(default)]
    load_id: Option<String>,
    #[serde(default)]
    overall_status: Option<OverallStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverallStatus {
    status: String,
    #[serde(default)]
    total_records: u64,
    #[serde(default)]
    parsing_errors: u64,
    #[serde(default)]
    insert_errors: u64,
}

impl HttpGraphSink {
    pub fn new(
        loader_endpoint: impl Into<String>,
        source_base: impl Into<String>,
    ) -> Result<Self, SinkError> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            loader_endpoint: loader_endpoint.into(),
            source_base: source_base.into(),
        })
    }
}

#[async_trait]
impl GraphSink for HttpGraphSink {
    async fn begin_load(&self, staged: &StagedGraph) -> Result<LoadId, SinkError> {
        let source = format!(
            "{}/{}",
            self.source_base.trim_end_matches('/'),
            staged.path.display()
        );
        let body = json!({
            "source": source,
            "format": "turtle",
            "failOnError": "FALSE",
            "parallelism": "MEDIUM",
        });

        let response = self
            .client
            .post(&self.loader_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SinkError::Unavailable(format!("loader returned {status}")));
        }
        if !status.is_success() {
            return Err(SinkError::Rejected(format!("loader returned {status}")));
        }

        let parsed: LoaderResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Protocol(e.to_string()))?;
        parsed
            .payload
            .load_id
            .map(LoadId)
            .ok_or_else(|| SinkError::Protocol("loader response carried no loadId".into()))
    }

    async fn load_status(&self, id: &LoadId) -> Result<LoadStatus, SinkError> {
        let url = format!("{}/{}", self.loader_endpoint.trim_end_matches('/'), id.0);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Unavailable(format!(
                "loader status returned {status}"
            )));
        }

        let parsed: LoaderResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Protocol(e.to_string()))?;
        let overall = parsed
            .payload
            .overall_status
            .ok_or_else(|| SinkError::Protocol("loader status carried no overallStatus".into()))?;

        match overall.status.as_str() {
            "LOAD_COMPLETED" => Ok(LoadStatus::Completed {
                records: overall.total_records,
            }),
            "LOAD_FAILED" | "LOAD_CANCELLED" => Ok(LoadStatus::Failed {
                errors: overall.parsing_errors + overall.insert_errors,
            }),
            _ => Ok(LoadStatus::InProgress),
        }
    }
}

// ============================================================================
// Vector index bulk upsert
// ============================================================================

pub struct HttpVectorSink {
    client: reqwest::Client,
    endpoint: String,
    index: String,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(default)]
    index: Option<BulkItemIndex>,
}

#[derive(Deserialize)]
struct BulkItemIndex {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl HttpVectorSink {
    pub fn new(endpoint: impl Into<String>, index: impl Into<String>) -> Result<Self, SinkError> {
        Ok(Self {
            client: build_client(Duration::from_secs(60))?,
            endpoint: endpoint.into(),
            index: index.into(),
        })
    }

    fn bulk_body(&self, records: &[VectorRecord]) -> String {
        let mut lines = Vec::with_capacity(records.len() * 2);
        for record in records {
            lines.push(
                json!({"index": {"_index": self.index, "_id": record.id}}).to_string(),
            );
            lines.push(
                json!({
                    "id": record.id,
                    "embedding": record.vector,
                    "text": record.text,
                    "metadata": record.metadata,
                })
                .to_string(),
            );
        }
        // The bulk API requires a trailing newline.
        lines.join("\n") + "\n"
    }
}

#[async_trait]
impl VectorSink for HttpVectorSink {
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize, SinkError> {
        let url = format!("{}/_bulk", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(self.bulk_body(records))
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SinkError::Unavailable(format!("bulk API returned {status}")));
        }
        if !status.is_success() {
            return Err(SinkError::Rejected(format!("bulk API returned {status}")));
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Protocol(e.to_string()))?;

        if parsed.errors {
            let failed = parsed
                .items
                .iter()
                .filter(|i| i.index.as_ref().is_some_and(|x| x.error.is_some()))
                .count();
            // Upserts are idempotent by id, so resubmitting the whole batch
            // is safe; classify as transient and let the retry budget decide.
            return Err(SinkError::Unavailable(format!(
                "{failed} of {} record(s) failed to index",
                records.len()
            )));
        }

        Ok(parsed
            .items
            .iter()
            .filter(|i| {
                i.index
                    .as_ref()
                    .and_then(|x| x.result.as_deref())
                    .is_some_and(|r| r == "created" || r == "updated")
            })
            .count())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn bulk_body_alternates_action_and_document_lines() {
        let sink = HttpVectorSink::new("http://localhost:9200", "document-embeddings").unwrap();
        let records = vec![
            VectorRecord {
                id: "d1-0".into(),
                vector: vec![0.5],
                text: "alpha".into(),
                metadata: BTreeMap::new(),
            },
            VectorRecord {
                id: "d1-1".into(),
                vector: vec![0.25],
                text: "beta".into(),
                metadata: BTreeMap::new(),
            },
        ];
        let body = sink.bulk_body(&records);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("\"_id\":\"d1-0\""));
        assert!(lines[1].contains("\"text\":\"alpha\""));
        assert!(lines[2].contains("\"_id\":\"d1-1\""));
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn loader_status_strings_map_to_load_status() {
        let completed: LoaderResponse = serde_json::from_value(serde_json::json!({
            "payload": {"overallStatus": {"status": "LOAD_COMPLETED", "totalRecords": 42}}
        }))
        .unwrap();
        let overall = completed.payload.overall_status.unwrap();
        assert_eq!(overall.status, "LOAD_COMPLETED");
        assert_eq!(overall.total_records, 42);

        let failed: LoaderResponse = serde_json::from_value(serde_json::json!({
            "payload": {"overallStatus": {
                "status": "LOAD_FAILED", "parsingErrors": 2, "insertErrors": 1
            }}
        }))
        .unwrap();
        let overall = failed.payload.overall_status.unwrap();
        assert_eq!(overall.parsing_errors + overall.insert_errors, 3);
    }
}
