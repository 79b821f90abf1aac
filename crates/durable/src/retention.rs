//! Retention of partition files
//!
//! Deletes old `app_<date>.log` files. Today's file is never deleted,
//! whatever the policy, and files that are not partitions are never looked
//! at. "Today" is resolved once per call.

use std::collections::HashSet;
use std::sync::Arc;

use campuslog_core::Clock;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::writer::{DirectoryError, LogDirectory, PartitionFile};

/// Which partition files survive a cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    KeepTodayOnly,
    /// Delete files dated more than this many days before today
    MaxAgeDays(u32),
    /// Delete everything except the named files
    KeepNamed(HashSet<String>),
}

impl RetentionPolicy {
    fn keeps(&self, file: &PartitionFile, today: NaiveDate) -> bool {
        if file.date == today {
            return true;
        }
        match self {
            Self::KeepTodayOnly => false,
            // A horizon before the earliest representable date keeps everything
            Self::MaxAgeDays(days) => today
                .checked_sub_days(Days::new(u64::from(*days)))
                .map_or(true, |horizon| file.date >= horizon),
            Self::KeepNamed(names) => names.contains(&file.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    /// Files that should have been deleted but could not be
    pub failed: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

pub struct RetentionManager {
    directory: LogDirectory,
    clock: Arc<dyn Clock>,
    retention_days: u32,
}

impl RetentionManager {
    pub fn new(directory: LogDirectory, clock: Arc<dyn Clock>, retention_days: u32) -> Self {
        Self {
            directory,
            clock,
            retention_days,
        }
    }

    /// `true` keeps only today's file; `false` applies the age policy
    pub async fn cleanup(&self, keep_today_only: bool) -> Result<CleanupReport, RetentionError> {
        let policy = if keep_today_only {
            RetentionPolicy::KeepTodayOnly
        } else {
            RetentionPolicy::MaxAgeDays(self.retention_days)
        };
        self.apply(&policy).await
    }

    #[instrument(skip(self))]
    pub async fn apply(&self, policy: &RetentionPolicy) -> Result<CleanupReport, RetentionError> {
        let today = self.clock.today();
        let files = self.directory.partition_files().await?;
        let mut report = CleanupReport::default();

        for file in files {
            if policy.keeps(&file, today) {
                report.kept.push(file.name);
                continue;
            }
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => report.deleted.push(file.name),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.deleted.push(file.name)
                }
                Err(e) => {
                    warn!(file = %file.name, "failed to delete log file: {}", e);
                    report.failed.push(file.name);
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            kept = report.kept.len(),
            failed = report.failed.len(),
            "log cleanup finished"
        );
        Ok(report)
    }
}
