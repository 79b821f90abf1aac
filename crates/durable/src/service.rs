//! EventLogService: the assembled pipeline
//!
//! Owns the writer thread, the enrichment dispatcher and the admin facade,
//! and gives them one lifecycle. Construct it once at startup, share it by
//! `Arc`, and call [`EventLogService::shutdown`] before exit so queued
//! lines reach disk and queued enrichment tasks are drained.

use std::sync::Arc;

use campuslog_core::{
    Clock, EncodedRecord, Event, EventBuilder, NewLogRecord, RecordOrigin, Severity, SystemClock,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::admin::AdminFacade;
use crate::config::PipelineConfig;
use crate::persistence::{LogRecordStore, StoreError};
use crate::worker::{
    promote, DispatchError, DispatcherMetricsSnapshot, DispatcherStatus, EnrichmentDispatcher,
    Promotion,
};
use crate::writer::{EventWriter, LogDirectory, WriterError, WriterStatsSnapshot};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Combined writer and dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub writer: WriterStatsSnapshot,
    pub dispatcher: DispatcherMetricsSnapshot,
    pub dispatcher_status: DispatcherStatus,
}

pub struct EventLogService {
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn LogRecordStore>,
    writer: Arc<EventWriter>,
    dispatcher: EnrichmentDispatcher,
    admin: AdminFacade,
    cancel: CancellationToken,
}

impl EventLogService {
    /// Start the pipeline on the system clock
    pub async fn start(
        config: PipelineConfig,
        store: Arc<dyn LogRecordStore>,
    ) -> Result<Self, ServiceError> {
        Self::start_with_clock(config, store, Arc::new(SystemClock)).await
    }

    #[instrument(skip_all, fields(log_dir = %config.log_dir.display()))]
    pub async fn start_with_clock(
        config: PipelineConfig,
        store: Arc<dyn LogRecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let directory = LogDirectory::new(&config.log_dir);
        let cancel = CancellationToken::new();

        let writer = Arc::new(EventWriter::start(
            directory.clone(),
            Arc::clone(&clock),
            config.writer.clone(),
        )?);
        let dispatcher = EnrichmentDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&writer),
            Arc::clone(&clock),
            config.dispatcher.clone(),
        );
        dispatcher.start()?;

        let admin = AdminFacade::new(
            Arc::clone(&store),
            directory,
            Arc::clone(&clock),
            config.retention_days,
            cancel.child_token(),
        );

        info!("event log service started");
        Ok(Self {
            config,
            clock,
            store,
            writer,
            dispatcher,
            admin,
            cancel,
        })
    }

    /// Start building an event stamped with the service clock
    pub fn event(
        &self,
        severity: Severity,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> EventBuilder {
        Event::builder(self.clock.as_ref(), severity, action, message)
    }

    /// Append the event to today's file and, for ERROR, queue enrichment.
    ///
    /// Never fails; waits only if the writer queue is full.
    pub async fn record(&self, event: &Event) {
        self.writer.record(event).await;
        self.dispatcher.maybe_enrich(event);
    }

    /// Append the event and insert its row synchronously, marked read.
    ///
    /// Used by the HTTP error boundary; the file line is written even when
    /// the insert fails.
    pub async fn record_error_direct(&self, event: &Event) -> Result<Promotion, StoreError> {
        self.writer.record(event).await;
        let row = NewLogRecord::from_encoded(&EncodedRecord::from_event(event), RecordOrigin::Direct)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        promote(self.store.as_ref(), row).await
    }

    /// Wait until every recorded event is on disk
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn admin(&self) -> &AdminFacade {
        &self.admin
    }

    pub fn store(&self) -> &Arc<dyn LogRecordStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            writer: self.writer.stats(),
            dispatcher: self.dispatcher.metrics(),
            dispatcher_status: self.dispatcher.status(),
        }
    }

    /// Cancel running imports, drain enrichment, then flush and stop the writer.
    ///
    /// The writer is stopped even if draining the dispatcher times out.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("shutting down event log service");
        self.cancel.cancel();

        let drained = self.dispatcher.shutdown().await;
        self.writer.shutdown().await?;
        drained?;

        info!("event log service stopped");
        Ok(())
    }
}
