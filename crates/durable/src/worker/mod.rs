//! Background enrichment of ERROR events
//!
//! This module provides:
//! - [`EnrichmentDispatcher`] - bounded queue feeding a semaphore-limited worker pool
//! - [`DispatcherMetrics`] - queue depth, in-flight and outcome counters
//! - [`promote`] - dedup-then-insert step shared with the direct-error path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   EnrichmentDispatcher                       │
//! │                                                              │
//! │  maybe_enrich ──try_send──▶ [ bounded queue ] ──▶ dispatch   │
//! │   (ERROR only,                                    loop       │
//! │    never blocks)                                   │         │
//! │                                                    ▼         │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Workers (Semaphore-limited)                   │    │
//! │  │  classify → extract → dedup → insert                 │    │
//! │  │  retry w/ backoff, soft + hard timeout per attempt   │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod dispatcher;
mod enricher;
mod metrics;

pub use dispatcher::{
    DispatchError, DispatcherConfig, DispatcherStatus, EnrichmentDispatcher, EnrichmentTask,
};
pub use enricher::{promote, Promotion};
pub use metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
