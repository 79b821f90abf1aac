// Pipeline configuration
//
// Loaded from environment variables with defaults for everything.
// Decision: an unparsable value falls back to the default with a warning
// instead of failing startup; logging must come up even if misconfigured.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::worker::DispatcherConfig;
use crate::writer::WriterConfig;

/// Configuration for the whole event-log pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding `app_<YYYY-MM-DD>.log` files
    pub log_dir: PathBuf,

    pub writer: WriterConfig,

    pub dispatcher: DispatcherConfig,

    /// Age limit applied by `cleanup(keep_today_only = false)`
    pub retention_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            writer: WriterConfig::default(),
            dispatcher: DispatcherConfig::default(),
            retention_days: 30,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `CAMPUSLOG_DIR`: log directory (default: `logs`)
    /// - `CAMPUSLOG_WRITER_QUEUE`: writer queue capacity (default: 4096)
    /// - `CAMPUSLOG_ENRICH_QUEUE`: enrichment queue capacity (default: 1024)
    /// - `CAMPUSLOG_ENRICH_CONCURRENCY`: enrichment workers (default: 4)
    /// - `CAMPUSLOG_ENRICH_MAX_ATTEMPTS`: attempts per task (default: 3)
    /// - `CAMPUSLOG_ENRICH_SOFT_TIMEOUT_MS`: slow-attempt warning threshold (default: 2000)
    /// - `CAMPUSLOG_ENRICH_HARD_TIMEOUT_MS`: per-attempt limit (default: 10000)
    /// - `CAMPUSLOG_RETENTION_DAYS`: age policy for cleanup (default: 30)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("CAMPUSLOG_DIR") {
            if !dir.trim().is_empty() {
                config.log_dir = PathBuf::from(dir);
            }
        }
        if let Some(capacity) = env_parse::<usize>("CAMPUSLOG_WRITER_QUEUE") {
            config.writer.queue_capacity = capacity.max(1);
        }
        if let Some(capacity) = env_parse::<usize>("CAMPUSLOG_ENRICH_QUEUE") {
            config.dispatcher.queue_capacity = capacity.max(1);
        }
        if let Some(concurrency) = env_parse::<usize>("CAMPUSLOG_ENRICH_CONCURRENCY") {
            config.dispatcher.concurrency = concurrency.max(1);
        }
        if let Some(attempts) = env_parse::<u32>("CAMPUSLOG_ENRICH_MAX_ATTEMPTS") {
            config.dispatcher.retry = config.dispatcher.retry.with_max_attempts(attempts);
        }
        if let Some(ms) = env_parse::<u64>("CAMPUSLOG_ENRICH_SOFT_TIMEOUT_MS") {
            config.dispatcher.timeout.soft = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse::<u64>("CAMPUSLOG_ENRICH_HARD_TIMEOUT_MS") {
            config.dispatcher.timeout.hard = Duration::from_millis(ms.max(1));
        }
        if let Some(days) = env_parse::<u32>("CAMPUSLOG_RETENTION_DAYS") {
            config.retention_days = days;
        }

        config
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}
