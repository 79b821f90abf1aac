//! Promotion of one row into the error index
//!
//! Shared by the enrichment workers and the direct-error path: check the
//! dedup key, insert only when no matching row exists.

use campuslog_core::{LogRecord, NewLogRecord};
use tracing::debug;
use uuid::Uuid;

use crate::persistence::{LogRecordStore, StoreError};

/// Result of promoting a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    Inserted(LogRecord),
    /// An equivalent row already exists
    Duplicate(Uuid),
}

impl Promotion {
    pub fn log_id(&self) -> Uuid {
        match self {
            Self::Inserted(record) => record.log_id,
            Self::Duplicate(id) => *id,
        }
    }
}

/// Insert `row` unless a row with the same dedup key is already stored.
///
/// The check and the insert are not atomic: a concurrent importer can
/// still slip a duplicate in between.
pub async fn promote(store: &dyn LogRecordStore, row: NewLogRecord) -> Result<Promotion, StoreError> {
    let key = row.dedup_key();
    if let Some(existing) = store.find_duplicate(&key).await? {
        debug!(log_id = %existing, "duplicate error row skipped");
        return Ok(Promotion::Duplicate(existing));
    }
    Ok(Promotion::Inserted(store.insert(row).await?))
}
