//! Operator actions over the files and the error index
//!
//! Thin orchestration on top of the store, importer and retention
//! manager. The one multi-step action, [`AdminFacade::cleanup_and_import_errors`],
//! reports every step instead of bailing with the first error.

use std::sync::Arc;

use campuslog_core::{Clock, LogRecord};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::importer::{ImportError, ImportOptions, ImportSummary, ImportTarget, Importer};
use crate::persistence::{LogFilter, LogRecordStore, Pagination, StoreError};
use crate::retention::{CleanupReport, RetentionError, RetentionManager, RetentionPolicy};
use crate::writer::{DirectoryError, FileInfo, LogDirectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStepKind {
    DeleteAllLogs,
    CleanupFiles,
    ImportTodayErrors,
}

impl RecoveryStepKind {
    const SEQUENCE: [RecoveryStepKind; 3] = [
        Self::DeleteAllLogs,
        Self::CleanupFiles,
        Self::ImportTodayErrors,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub step: RecoveryStepKind,
    pub status: StepStatus,
    pub message: String,
}

/// Per-step outcome of the recovery sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub steps: Vec<RecoveryStep>,
    pub rows_deleted: Option<u64>,
    pub cleanup: Option<CleanupReport>,
    pub import: Option<ImportSummary>,
}

impl RecoveryReport {
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn completed_steps(&self) -> Vec<RecoveryStepKind> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.step)
            .collect()
    }

    fn completed(&mut self, step: RecoveryStepKind, message: String) {
        self.steps.push(RecoveryStep {
            step,
            status: StepStatus::Completed,
            message,
        });
    }

    /// Record a failure and mark every later step skipped
    fn failed(&mut self, step: RecoveryStepKind, message: String) {
        warn!(?step, "recovery step failed: {}", message);
        self.steps.push(RecoveryStep {
            step,
            status: StepStatus::Failed,
            message,
        });
        for later in RecoveryStepKind::SEQUENCE
            .iter()
            .skip_while(|s| **s != step)
            .skip(1)
        {
            self.steps.push(RecoveryStep {
                step: *later,
                status: StepStatus::Skipped,
                message: "not run".to_string(),
            });
        }
    }
}

/// A cleanup that left files behind is a failed step
fn cleanup_outcome(cleanup: &CleanupReport) -> Result<String, String> {
    if cleanup.failed.is_empty() {
        Ok(format!(
            "deleted {} file(s), kept {}",
            cleanup.deleted.len(),
            cleanup.kept.len()
        ))
    } else {
        Err(format!(
            "could not delete {} file(s): {}",
            cleanup.failed.len(),
            cleanup.failed.join(", ")
        ))
    }
}

/// Operator-facing entry point
pub struct AdminFacade {
    store: Arc<dyn LogRecordStore>,
    directory: LogDirectory,
    importer: Importer,
    retention: RetentionManager,
    cancel: CancellationToken,
}

impl AdminFacade {
    pub fn new(
        store: Arc<dyn LogRecordStore>,
        directory: LogDirectory,
        clock: Arc<dyn Clock>,
        retention_days: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            importer: Importer::new(Arc::clone(&store), directory.clone(), Arc::clone(&clock)),
            retention: RetentionManager::new(directory.clone(), clock, retention_days),
            store,
            directory,
            cancel,
        }
    }

    /// Name, date, size, line count and mtime of every partition file
    pub async fn list_files_info(&self) -> Result<Vec<FileInfo>, DirectoryError> {
        self.directory.list_info().await
    }

    /// Import ERROR lines from every file
    pub async fn import(&self, limit_per_file: Option<usize>) -> Result<ImportSummary, ImportError> {
        self.import_with(
            &ImportTarget::All,
            &ImportOptions::errors().with_per_file_limit(limit_per_file),
        )
        .await
    }

    pub async fn import_with(
        &self,
        target: &ImportTarget,
        options: &ImportOptions,
    ) -> Result<ImportSummary, ImportError> {
        self.importer.import(target, options, &self.cancel).await
    }

    pub async fn cleanup(&self, keep_today_only: bool) -> Result<CleanupReport, RetentionError> {
        self.retention.cleanup(keep_today_only).await
    }

    pub async fn apply_retention(
        &self,
        policy: &RetentionPolicy,
    ) -> Result<CleanupReport, RetentionError> {
        self.retention.apply(policy).await
    }

    /// Wipe the index, keep only today's file, re-import today's errors
    #[instrument(skip(self))]
    pub async fn cleanup_and_import_errors(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        match self.store.delete_all().await {
            Ok(rows) => {
                report.rows_deleted = Some(rows);
                report.completed(RecoveryStepKind::DeleteAllLogs, format!("deleted {rows} row(s)"));
            }
            Err(e) => {
                report.failed(RecoveryStepKind::DeleteAllLogs, e.to_string());
                return report;
            }
        }

        match self.retention.cleanup(true).await {
            Ok(cleanup) => match cleanup_outcome(&cleanup) {
                Ok(message) => {
                    report.completed(RecoveryStepKind::CleanupFiles, message);
                    report.cleanup = Some(cleanup);
                }
                Err(message) => {
                    report.failed(RecoveryStepKind::CleanupFiles, message);
                    report.cleanup = Some(cleanup);
                    return report;
                }
            },
            Err(e) => {
                report.failed(RecoveryStepKind::CleanupFiles, e.to_string());
                return report;
            }
        }

        match self
            .importer
            .import(&ImportTarget::Today, &ImportOptions::errors(), &self.cancel)
            .await
        {
            Ok(summary) if summary.files_failed > 0 || summary.cancelled => {
                let reason = summary
                    .files
                    .iter()
                    .find_map(|f| f.error.clone())
                    .unwrap_or_else(|| "import cancelled".to_string());
                report.failed(RecoveryStepKind::ImportTodayErrors, reason);
                report.import = Some(summary);
            }
            Ok(summary) => {
                report.completed(
                    RecoveryStepKind::ImportTodayErrors,
                    format!(
                        "imported {} record(s) from {} file(s)",
                        summary.records_imported, summary.files_processed
                    ),
                );
                report.import = Some(summary);
            }
            Err(e) => report.failed(RecoveryStepKind::ImportTodayErrors, e.to_string()),
        }

        info!(succeeded = report.succeeded(), "recovery sequence finished");
        report
    }

    pub async fn delete_all_logs(&self) -> Result<u64, StoreError> {
        self.store.delete_all().await
    }

    pub async fn delete_read_errors(&self) -> Result<u64, StoreError> {
        self.store.delete_read().await
    }

    pub async fn mark_rows_fixed(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.store.mark_fixed(ids).await
    }

    pub async fn mark_rows_read(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.store.mark_read(ids).await
    }

    pub async fn delete_rows(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.store.delete_ids(ids).await
    }

    pub async fn get_row(&self, log_id: Uuid) -> Result<LogRecord, StoreError> {
        self.store.get(log_id).await
    }

    pub async fn list_rows(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Vec<LogRecord>, StoreError> {
        self.store.list(filter, pagination).await
    }

    pub async fn count_rows(&self, filter: &LogFilter) -> Result<u64, StoreError> {
        self.store.count(filter).await
    }
}
