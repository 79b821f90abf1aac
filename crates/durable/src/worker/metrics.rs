//! Dispatcher counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters updated by the dispatcher and its workers
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    in_flight: AtomicUsize,
    enqueued: AtomicU64,
    rejected: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    failed_attempts: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time view of [`DispatcherMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherMetricsSnapshot {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub enqueued: u64,
    pub rejected: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub failed_attempts: u64,
    pub failures: u64,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn task_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn row_inserted(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn duplicate_skipped(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn attempt_failed(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, queue_depth: usize) -> DispatcherMetricsSnapshot {
        DispatcherMetricsSnapshot {
            queue_depth,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_lifecycle() {
        let metrics = DispatcherMetrics::new();
        metrics.task_enqueued();
        metrics.task_enqueued();
        metrics.task_rejected();
        metrics.task_started();
        metrics.attempt_failed();
        metrics.row_inserted();

        let snapshot = metrics.snapshot(1);
        assert_eq!(snapshot.queue_depth, 1);
        assert_eq!(snapshot.in_flight, 1);
        assert_eq!(snapshot.enqueued, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.failed_attempts, 1);
        assert_eq!(snapshot.inserted, 1);

        metrics.task_finished();
        assert_eq!(metrics.in_flight(), 0);
    }
}
