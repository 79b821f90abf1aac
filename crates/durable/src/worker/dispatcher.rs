//! Enrichment dispatcher
//!
//! Promotes ERROR events into the relational index off the request path.
//! Submission never blocks: a full queue rejects the task (the event is
//! already in the file, so the importer can recover it later). A dispatch
//! loop hands queued tasks to a semaphore-limited pool of workers, each
//! attempt bounded by a [`TaskTimeout`] and retried per [`RetryPolicy`].

use std::sync::Arc;
use std::time::Duration;

use campuslog_core::record::format_timestamp;
use campuslog_core::{actions, Clock, EncodedRecord, Event, NewLogRecord, RecordOrigin, Severity};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::enricher::{promote, Promotion};
use super::metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
use crate::persistence::LogRecordStore;
use crate::reliability::{RetryPolicy, TaskTimeout};
use crate::writer::EventWriter;

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Tasks waiting for a worker beyond this are rejected
    pub queue_capacity: usize,

    /// Maximum concurrent enrichment tasks
    pub concurrency: usize,

    pub retry: RetryPolicy,

    pub timeout: TaskTimeout,

    /// How long shutdown waits for queued and in-flight tasks
    #[serde(with = "crate::reliability::duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            concurrency: 4,
            retry: RetryPolicy::enrichment(),
            timeout: TaskTimeout::default(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl DispatcherConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: TaskTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherStatus {
    /// Created, accepting tasks, no workers yet
    Idle,
    Running,
    /// No longer accepting, finishing queued and in-flight tasks
    Draining,
    Stopped,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is already running")]
    AlreadyRunning,

    #[error("dispatcher has been stopped")]
    Stopped,

    #[error("shutdown timed out with {remaining} task(s) in flight")]
    ShutdownTimeout { remaining: usize },
}

/// One unit of background work: the full original event
#[derive(Debug, Clone)]
pub struct EnrichmentTask {
    pub event: Event,
}

struct Worker {
    store: Arc<dyn LogRecordStore>,
    writer: Arc<EventWriter>,
    clock: Arc<dyn Clock>,
    metrics: Arc<DispatcherMetrics>,
    retry: RetryPolicy,
    timeout: TaskTimeout,
}

/// Bounded queue plus worker pool promoting ERROR events
pub struct EnrichmentDispatcher {
    worker: Arc<Worker>,
    config: DispatcherConfig,
    sender: RwLock<Option<mpsc::Sender<EnrichmentTask>>>,
    receiver: Mutex<Option<mpsc::Receiver<EnrichmentTask>>>,
    status: RwLock<DispatcherStatus>,
    permits: Arc<Semaphore>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EnrichmentDispatcher {
    pub fn new(
        store: Arc<dyn LogRecordStore>,
        writer: Arc<EventWriter>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = Worker {
            store,
            writer,
            clock,
            metrics: Arc::new(DispatcherMetrics::new()),
            retry: config.retry.clone(),
            timeout: config.timeout.clone(),
        };

        Self {
            worker: Arc::new(worker),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            config,
            sender: RwLock::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            status: RwLock::new(DispatcherStatus::Idle),
            loop_handle: Mutex::new(None),
        }
    }

    /// Spawn the dispatch loop
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<(), DispatchError> {
        match *self.status.read() {
            DispatcherStatus::Idle => {}
            DispatcherStatus::Running => return Err(DispatchError::AlreadyRunning),
            DispatcherStatus::Draining | DispatcherStatus::Stopped => {
                return Err(DispatchError::Stopped)
            }
        }
        let Some(mut rx) = self.receiver.lock().take() else {
            return Err(DispatchError::AlreadyRunning);
        };

        info!(
            concurrency = self.config.concurrency,
            queue_capacity = self.config.queue_capacity,
            "starting enrichment dispatcher"
        );

        let worker = Arc::clone(&self.worker);
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let worker = Arc::clone(&worker);
                let in_flight = InFlight::enter(Arc::clone(&worker.metrics));
                tokio::spawn(async move {
                    worker.run(task).await;
                    drop(in_flight);
                    drop(permit);
                });
            }
            debug!("dispatch loop exited");
        });

        *self.loop_handle.lock() = Some(handle);
        *self.status.write() = DispatcherStatus::Running;
        Ok(())
    }

    /// Submit an event for promotion. No-op unless severity is ERROR.
    ///
    /// Returns whether a task was queued. Never blocks.
    pub fn maybe_enrich(&self, event: &Event) -> bool {
        if !event.severity.is_promotable() {
            return false;
        }

        let Some(tx) = self.sender.read().clone() else {
            self.worker.metrics.task_rejected();
            debug!(action = %event.action, "dispatcher stopped, enrichment skipped");
            return false;
        };

        match tx.try_send(EnrichmentTask {
            event: event.clone(),
        }) {
            Ok(()) => {
                self.worker.metrics.task_enqueued();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.worker.metrics.task_rejected();
                warn!(
                    action = %event.action,
                    capacity = self.config.queue_capacity,
                    "enrichment queue full, event left for batch import"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.worker.metrics.task_rejected();
                false
            }
        }
    }

    /// Stop accepting tasks, drain the queue and wait for in-flight work
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        {
            let mut status = self.status.write();
            if *status == DispatcherStatus::Stopped {
                return Ok(());
            }
            *status = DispatcherStatus::Draining;
        }

        info!("draining enrichment dispatcher");
        self.sender.write().take();
        // Never started: nothing will consume what is queued
        self.receiver.lock().take();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                let remaining = self.worker.metrics.in_flight();
                warn!(remaining, "dispatcher shutdown timed out draining queue");
                return Err(DispatchError::ShutdownTimeout { remaining });
            }
        }

        let max = self.config.concurrency.max(1);
        loop {
            let available = self.permits.available_permits();
            if available == max {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                let remaining = max - available;
                warn!(remaining, "dispatcher shutdown timed out");
                return Err(DispatchError::ShutdownTimeout { remaining });
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        *self.status.write() = DispatcherStatus::Stopped;
        info!("enrichment dispatcher stopped");
        Ok(())
    }

    pub fn status(&self) -> DispatcherStatus {
        *self.status.read()
    }

    pub fn metrics(&self) -> DispatcherMetricsSnapshot {
        let queue_depth = self
            .sender
            .read()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0);
        self.worker.metrics.snapshot(queue_depth)
    }
}

impl Worker {
    async fn run(&self, task: EnrichmentTask) {
        let encoded = EncodedRecord::from_event(&task.event);
        let row = match NewLogRecord::from_encoded(&encoded, RecordOrigin::Enrichment) {
            Ok(row) => row,
            Err(e) => {
                self.give_up(&task, 0, &e.to_string()).await;
                return;
            }
        };

        let mut attempt = 1;
        loop {
            let outcome = self
                .timeout
                .run("enrichment", promote(self.store.as_ref(), row.clone()))
                .await;

            let error = match outcome {
                Ok(Ok(Promotion::Inserted(record))) => {
                    self.metrics.row_inserted();
                    debug!(log_id = %record.log_id, action = %record.action, "error row promoted");
                    return;
                }
                Ok(Ok(Promotion::Duplicate(_))) => {
                    self.metrics.duplicate_skipped();
                    return;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };

            self.metrics.attempt_failed();
            if !self.retry.has_attempts_remaining(attempt) {
                self.give_up(&task, attempt, &error).await;
                return;
            }

            attempt += 1;
            let delay = self.retry.delay_for_attempt(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying enrichment: {}", error);
            tokio::time::sleep(delay).await;
        }
    }

    /// Final failure: log it and leave a WARNING breadcrumb in the file
    async fn give_up(&self, task: &EnrichmentTask, attempts: u32, reason: &str) {
        self.metrics.task_failed();
        error!(
            action = %task.event.action,
            attempts,
            "enrichment failed: {}",
            reason
        );

        let breadcrumb = Event::builder(
            self.clock.as_ref(),
            Severity::Warning,
            actions::ENRICHMENT_FAILED,
            format!("Enrichment gave up after {attempts} attempt(s)"),
        )
        .field("error", reason)
        .field("original_action", task.event.action.clone())
        .field("original_message", task.event.message.clone())
        .field("original_timestamp", format_timestamp(task.event.occurred_at))
        .build();

        self.writer.record(&breadcrumb).await;
    }
}

/// Keeps the in-flight gauge honest even if a worker panics
struct InFlight(Arc<DispatcherMetrics>);

impl InFlight {
    fn enter(metrics: Arc<DispatcherMetrics>) -> Self {
        metrics.task_started();
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.task_finished();
    }
}
