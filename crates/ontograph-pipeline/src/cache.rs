//! Ontology model cache.
//!
//! The cache is the only resource shared across concurrent executions. It is
//! read-mostly: `get()` serves the cached model while it is younger than the
//! TTL, and refreshes through the backing schema store otherwise. Refresh is
//! single-flight: concurrent misses share one in-flight fetch instead of
//! each hitting the store.
//!
//! Fallback rules:
//! - refresh fails but a last-good model exists: serve it stale and record a
//!   staleness warning
//! - refresh fails and nothing was ever loaded: `SchemaUnavailable`
//!
//! The cache is an injected dependency of the validator stage and the
//! orchestrator, never a process-wide global, so tests supply fixture models
//! through a stub store.

use crate::error::{PipelineError, SchemaStoreError};
use async_trait::async_trait;
use ontograph_model::OntologyModel;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Backing store the cache refreshes from.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError>;
}

struct CachedModel {
    model: Arc<OntologyModel>,
    fetched_at: Instant,
}

pub struct OntologyCache {
    store: Arc<dyn SchemaStore>,
    ttl: Duration,
    current: RwLock<Option<CachedModel>>,
    /// Held across a refresh; concurrent misses queue here and re-check.
    refresh: tokio::sync::Mutex<()>,
    refreshes: AtomicU64,
    stale_serves: AtomicU64,
}

impl OntologyCache {
    pub fn new(store: Arc<dyn SchemaStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            current: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
            refreshes: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
        }
    }

    /// Return the current model, refreshing if the cached copy is stale or
    /// absent. Never blocks past one store fetch.
    pub async fn get(&self) -> Result<Arc<OntologyModel>, PipelineError> {
        if let Some(model) = self.fresh_model() {
            return Ok(model);
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited on the lock.
        if let Some(model) = self.fresh_model() {
            return Ok(model);
        }

        debug!("ontology cache miss, refreshing from schema store");
        match self.store.fetch_model().await {
            Ok(mut model) => {
                model.reindex();
                let model = Arc::new(model);
                *self.current.write() = Some(CachedModel {
                    model: model.clone(),
                    fetched_at: Instant::now(),
                });
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                info!(version = %model.version, "ontology model refreshed");
                Ok(model)
            }
            Err(err) => {
                let stale = self.current.read().as_ref().map(|c| c.model.clone());
                match stale {
                    Some(model) => {
                        self.stale_serves.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %err, version = %model.version,
                            "schema refresh failed, serving last good model stale");
                        Ok(model)
                    }
                    None => Err(PipelineError::SchemaUnavailable {
                        message: format!("no cached model and refresh failed: {err}"),
                    }),
                }
            }
        }
    }

    fn fresh_model(&self) -> Option<Arc<OntologyModel>> {
        let guard = self.current.read();
        let cached = guard.as_ref()?;
        if cached.fetched_at.elapsed() < self.ttl {
            Some(cached.model.clone())
        } else {
            None
        }
    }

    /// Number of successful refreshes so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Number of times a stale model was served after a failed refresh.
    pub fn stale_serve_count(&self) -> u64 {
        self.stale_serves.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Schema store backed by a JSON model document on disk.
pub struct FileSchemaStore {
    path: PathBuf,
}

impl FileSchemaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SchemaStore for FileSchemaStore {
    async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SchemaStoreError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let json = String::from_utf8(bytes)
            .map_err(|e| SchemaStoreError::Malformed(e.to_string()))?;
        OntologyModel::from_json(&json).map_err(|e| SchemaStoreError::Malformed(e.to_string()))
    }
}

/// Schema store backed by an HTTP endpoint serving the JSON model document.
pub struct HttpSchemaStore {
    client: reqwest::Client,
    url: String,
}

impl HttpSchemaStore {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::permanent("schema-store", e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SchemaStore for HttpSchemaStore {
    async fn fetch_model(&self) -> Result<OntologyModel, SchemaStoreError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SchemaStoreError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SchemaStoreError::Unavailable(format!(
                "schema endpoint returned {}",
                response.status()
            )));
        }
        let json = response
            .text()
            .await
            .map_err(|e| SchemaStoreError::Unavailable(e.to_string()))?;
        OntologyModel::from_json(&json).map_err(|e| SchemaStoreError::Malformed(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
