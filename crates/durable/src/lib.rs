//! # Campuslog durable pipeline
//!
//! Durable event logging with opportunistic promotion of errors into a
//! relational index, plus the batch tooling that keeps the two consistent.
//!
//! ## Features
//!
//! - **Never-drop file writer**: dedicated thread, bounded queue, one sync per batch
//! - **Background enrichment**: ERROR events classified and inserted off the request path
//! - **Idempotent reconciliation**: the index can be rebuilt from the files at any time
//! - **Retention**: date-partitioned files deleted by policy, today's file always kept
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EventLogService                         │
//! │   record(event) ─────────────┬──────────────────────────┐   │
//! │                              ▼                          │   │
//! │                     EventWriter (thread)          [ERROR only]
//! │                     app_<YYYY-MM-DD>.log                ▼   │
//! │                              │               EnrichmentDispatcher
//! │                              │                          │   │
//! │                              ▼                          ▼   │
//! │                         Importer ──────────▶ LogRecordStore │
//! │                    (files → rows, dedup)   (log_records)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use campuslog_durable::prelude::*;
//!
//! let store = Arc::new(InMemoryLogRecordStore::new());
//! let service = EventLogService::start(PipelineConfig::from_env(), store).await?;
//!
//! let event = service
//!     .event(Severity::Error, actions::CREATE, "CREATE FAILED on students")
//!     .user_id("42")
//!     .build();
//! service.record(&event).await;
//!
//! service.shutdown().await?;
//! ```

pub mod admin;
pub mod config;
pub mod importer;
pub mod persistence;
pub mod reliability;
pub mod retention;
pub mod service;
pub mod worker;
pub mod writer;

/// Prelude for common imports
pub mod prelude {
    pub use crate::admin::{AdminFacade, RecoveryReport, RecoveryStep, RecoveryStepKind, StepStatus};
    pub use crate::config::PipelineConfig;
    pub use crate::importer::{ImportOptions, ImportSummary, ImportTarget, Importer};
    pub use crate::persistence::{
        InMemoryLogRecordStore, LogFilter, LogRecordStore, Pagination, PostgresLogRecordStore,
        StoreError,
    };
    pub use crate::reliability::{RetryPolicy, TaskTimeout};
    pub use crate::retention::{CleanupReport, RetentionManager, RetentionPolicy};
    pub use crate::service::{EventLogService, PipelineStats, ServiceError};
    pub use crate::worker::{DispatcherConfig, EnrichmentDispatcher, Promotion};
    pub use crate::writer::{EventWriter, LogDirectory, WriterConfig};
    pub use campuslog_core::{actions, Clock, Event, LogRecord, LogStatus, Severity, SystemClock};
    pub use std::sync::Arc;
}

// Re-export main types at crate root
pub use admin::{AdminFacade, RecoveryReport};
pub use config::PipelineConfig;
pub use importer::{ImportError, ImportOptions, ImportSummary, ImportTarget, Importer};
pub use persistence::{
    InMemoryLogRecordStore, LogFilter, LogRecordStore, Pagination, PostgresLogRecordStore,
    StoreError,
};
pub use reliability::{RetryPolicy, TaskTimeout, TimeoutError};
pub use retention::{CleanupReport, RetentionError, RetentionManager, RetentionPolicy};
pub use service::{EventLogService, PipelineStats, ServiceError};
pub use worker::{DispatchError, DispatcherConfig, DispatcherStatus, EnrichmentDispatcher, Promotion};
pub use writer::{DirectoryError, EventWriter, FileInfo, LogDirectory, WriterConfig};
