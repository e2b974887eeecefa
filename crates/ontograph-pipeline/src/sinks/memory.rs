//! In-memory sinks with scriptable failure behavior.
//!
//! Used by the test suites to drive every commit-branch outcome without
//! network I/O, and by the CLI's local demo mode. Failure scripts are
//! expressed as "fail the first N calls, then behave".

use crate::commit::{GraphSink, LoadId, LoadStatus, StagedGraph, VectorRecord, VectorSink};
use crate::error::SinkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Graph sink
// ============================================================================

#[derive(Clone, Copy)]
enum GraphMode {
    /// Every load completes after `polls_in_progress` status polls.
    Complete { polls_in_progress: u64, records: u64 },
    /// The first `failed_loads` loads end FAILED; later loads complete.
    FailLoads { failed_loads: u64, records: u64 },
    /// `begin_load` always returns `Unavailable`.
    Unavailable,
    /// `begin_load` always returns `Rejected`.
    Rejected,
}

pub struct MemoryGraphSink {
    mode: GraphMode,
    loads_started: AtomicU64,
    status_polls: AtomicU64,
    polls_this_load: AtomicU64,
}

impl MemoryGraphSink {
    fn with_mode(mode: GraphMode) -> Self {
        Self {
            mode,
            loads_started: AtomicU64::new(0),
            status_polls: AtomicU64::new(0),
            polls_this_load: AtomicU64::new(0),
        }
    }

    /// Loads complete after `polls_in_progress` InProgress polls.
    pub fn completing_after(polls_in_progress: u64, records: u64) -> Self {
        Self::with_mode(GraphMode::Complete {
            polls_in_progress,
            records,
        })
    }

    /// Completes immediately on the first status poll.
    pub fn completing(records: u64) -> Self {
        Self::completing_after(0, records)
    }

    /// The first `failed_loads` submitted loads end FAILED.
    pub fn failing_loads(failed_loads: u64, records: u64) -> Self {
        Self::with_mode(GraphMode::FailLoads {
            failed_loads,
            records,
        })
    }

    pub fn always_unavailable() -> Self {
        Self::with_mode(GraphMode::Unavailable)
    }

    pub fn rejecting() -> Self {
        Self::with_mode(GraphMode::Rejected)
    }

    pub fn loads_started(&self) -> u64 {
        self.loads_started.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> u64 {
        self.status_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphSink for MemoryGraphSink {
    async fn begin_load(&self, staged: &StagedGraph) -> Result<LoadId, SinkError> {
        match self.mode {
            GraphMode::Unavailable => {
                return Err(SinkError::Unavailable("loader endpoint down".into()))
            }
            GraphMode::Rejected => {
                return Err(SinkError::Rejected("staged unit refused".into()))
            }
            _ => {}
        }
        let n = self.loads_started.fetch_add(1, Ordering::SeqCst) + 1;
        self.polls_this_load.store(0, Ordering::SeqCst);
        Ok(LoadId(format!("{}-load-{n}", staged.document_id)))
    }

    async fn load_status(&self, _id: &LoadId) -> Result<LoadStatus, SinkError> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            GraphMode::Complete {
                polls_in_progress,
                records,
            } => {
                let poll = self.polls_this_load.fetch_add(1, Ordering::SeqCst);
                if poll < polls_in_progress {
                    Ok(LoadStatus::InProgress)
                } else {
                    Ok(LoadStatus::Completed { records })
                }
            }
            GraphMode::FailLoads {
                failed_loads,
                records,
            } => {
                if self.loads_started.load(Ordering::SeqCst) <= failed_loads {
                    Ok(LoadStatus::Failed { errors: 1 })
                } else {
                    Ok(LoadStatus::Completed { records })
                }
            }
            GraphMode::Unavailable | GraphMode::Rejected => {
                Err(SinkError::Protocol("no load in flight".into()))
            }
        }
    }
}

// ============================================================================
// Vector sink
// ============================================================================

#[derive(Default)]
pub struct MemoryVectorSink {
    stored: Mutex<BTreeMap<String, VectorRecord>>,
    calls: AtomicU64,
    fail_first: u64,
}

impl MemoryVectorSink {
    /// Fail the first `n` upsert calls with `Unavailable`, then accept.
    pub fn failing_first(n: u64) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    pub fn always_unavailable() -> Self {
        Self::failing_first(u64::MAX)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().len()
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.stored.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl VectorSink for MemoryVectorSink {
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize, SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(SinkError::Unavailable("index endpoint down".into()));
        }
        let mut stored = self.stored.lock();
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }
}
