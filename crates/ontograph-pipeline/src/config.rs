//! Pipeline configuration.
//!
//! Loaded from `ONTOGRAPH_*` environment variables with programmatic
//! defaults, so tests construct configs directly and deployments configure
//! through the environment.

use crate::retry::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cached ontology models older than this are refreshed on access.
    pub ontology_ttl: Duration,
    /// Hard deadline for one whole execution.
    pub execution_deadline: Duration,
    /// Retry policy applied to every I/O-bound stage.
    pub retry: RetryPolicy,
    /// Interval between bulk-load status polls.
    pub poll_interval: Duration,
    /// Directory where serialized fact graphs are staged for the bulk loader.
    pub staging_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ontology_ttl: Duration::from_secs(60 * 60),
            execution_deadline: Duration::from_secs(30 * 60),
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(5),
            staging_dir: PathBuf::from("staging"),
        }
    }
}

impl PipelineConfig {
    /// Load from environment variables, falling back to defaults per field.
    ///
    /// - `ONTOGRAPH_ONTOLOGY_TTL_SECS`
    /// - `ONTOGRAPH_DEADLINE_SECS`
    /// - `ONTOGRAPH_POLL_INTERVAL_SECS`
    /// - `ONTOGRAPH_STAGING_DIR`
    /// - `ONTOGRAPH_RETRY_MAX_ATTEMPTS`, `ONTOGRAPH_RETRY_BASE_DELAY_MS`,
    ///   `ONTOGRAPH_RETRY_MULTIPLIER`, `ONTOGRAPH_RETRY_MAX_DELAY_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ontology_ttl: env_secs("ONTOGRAPH_ONTOLOGY_TTL_SECS", defaults.ontology_ttl),
            execution_deadline: env_secs("ONTOGRAPH_DEADLINE_SECS", defaults.execution_deadline),
            retry: RetryPolicy::from_env(),
            poll_interval: env_secs("ONTOGRAPH_POLL_INTERVAL_SECS", defaults.poll_interval),
            staging_dir: std::env::var("ONTOGRAPH_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
        }
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

pub(crate) fn env_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

pub(crate) fn env_u32(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_f64(var: &str, default: f64) -> f64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}
