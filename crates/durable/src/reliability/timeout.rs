//! Per-attempt timeout enforcement
//!
//! A [`TaskTimeout`] has two thresholds: a soft one that only logs a
//! warning when an attempt runs long, and a hard one after which the
//! attempt is abandoned and counted as failed.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

/// Timeout-related errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutError {
    /// Attempt exceeded the hard limit and was abandoned
    #[error("{operation} timed out (ran for {elapsed:?}, limit {limit:?})")]
    HardLimit {
        operation: String,
        elapsed: Duration,
        limit: Duration,
    },
}

/// Soft and hard thresholds for one attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskTimeout {
    /// Log a warning once an attempt has run this long (None = never)
    #[serde(with = "crate::reliability::duration_millis::option")]
    pub soft: Option<Duration>,

    /// Abandon the attempt after this long
    #[serde(with = "crate::reliability::duration_millis")]
    pub hard: Duration,
}

impl Default for TaskTimeout {
    fn default() -> Self {
        Self {
            soft: Some(Duration::from_secs(2)),
            hard: Duration::from_secs(10),
        }
    }
}

impl TaskTimeout {
    pub fn new(soft: Option<Duration>, hard: Duration) -> Self {
        Self { soft, hard }
    }

    pub fn with_soft(mut self, soft: Duration) -> Self {
        self.soft = Some(soft);
        self
    }

    pub fn without_soft(mut self) -> Self {
        self.soft = None;
        self
    }

    pub fn with_hard(mut self, hard: Duration) -> Self {
        self.hard = hard;
        self
    }

    /// Run `fut` under both thresholds.
    ///
    /// Crossing the soft threshold only warns; the future keeps running
    /// until it completes or the hard limit elapses.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let soft = self.soft.filter(|soft| *soft < self.hard);

        let watched = async {
            tokio::pin!(fut);
            if let Some(soft) = soft {
                tokio::select! {
                    out = &mut fut => return out,
                    _ = tokio::time::sleep(soft) => {
                        warn!(
                            operation,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "attempt exceeded soft timeout"
                        );
                    }
                }
            }
            fut.await
        };

        tokio::time::timeout(self.hard, watched)
            .await
            .map_err(|_| TimeoutError::HardLimit {
                operation: operation.to_string(),
                elapsed: started.elapsed(),
                limit: self.hard,
            })
    }
}
