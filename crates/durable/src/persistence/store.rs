//! LogRecordStore trait definition

use async_trait::async_trait;
use campuslog_core::{DedupKey, LogRecord, LogStatus, NewLogRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Row not found
    #[error("log record not found: {0}")]
    NotFound(Uuid),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error (e.g. an unknown status string in a row)
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Filter for listing and counting rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub status: Option<LogStatus>,
    pub is_fixed: Option<bool>,
    pub is_read: Option<bool>,
    pub action: Option<String>,
    pub table_name: Option<String>,
}

impl LogFilter {
    pub fn errors() -> Self {
        Self {
            status: Some(LogStatus::Error),
            ..Default::default()
        }
    }

    /// Whether a row passes this filter
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self.is_fixed.map_or(true, |f| record.is_fixed == f)
            && self.is_read.map_or(true, |r| record.is_read == r)
            && self
                .action
                .as_deref()
                .map_or(true, |a| record.action == a)
            && self
                .table_name
                .as_deref()
                .map_or(true, |t| record.table_name.as_deref() == Some(t))
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// Store for the relational error index
///
/// Implementations must be thread-safe and tolerate concurrent writers:
/// the enrichment workers and the batch importer insert into the same
/// table without coordinating.
#[async_trait]
pub trait LogRecordStore: Send + Sync + 'static {
    // =========================================================================
    // Insert path
    // =========================================================================

    /// Find an existing row with the same dedup key
    async fn find_duplicate(&self, key: &DedupKey) -> Result<Option<Uuid>, StoreError>;

    /// Insert a single row
    async fn insert(&self, record: NewLogRecord) -> Result<LogRecord, StoreError>;

    /// Insert a batch atomically: either every row is committed or none is
    async fn insert_batch(&self, records: Vec<NewLogRecord>) -> Result<usize, StoreError>;

    // =========================================================================
    // Queries
    // =========================================================================

    async fn get(&self, log_id: Uuid) -> Result<LogRecord, StoreError>;

    /// Rows matching the filter, newest first
    async fn list(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Vec<LogRecord>, StoreError>;

    async fn count(&self, filter: &LogFilter) -> Result<u64, StoreError>;

    // =========================================================================
    // Operator mutations
    // =========================================================================

    /// Set is_fixed on the given rows; returns the number updated
    async fn mark_fixed(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    /// Set is_read on the given rows; returns the number updated
    async fn mark_read(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    async fn delete_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    /// Delete every row where is_read = true
    async fn delete_read(&self) -> Result<u64, StoreError>;

    /// Delete every row
    async fn delete_all(&self) -> Result<u64, StoreError>;
}
