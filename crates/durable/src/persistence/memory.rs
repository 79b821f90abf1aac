//! In-memory implementation of LogRecordStore
//!
//! Used by tests and by the control plane's dev mode. Provides the same
//! semantics as the PostgreSQL implementation, including all-or-nothing
//! batch inserts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use campuslog_core::{DedupKey, LogRecord, NewLogRecord};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;

/// In-memory implementation of LogRecordStore
///
/// # Example
///
/// ```
/// use campuslog_durable::InMemoryLogRecordStore;
///
/// let store = InMemoryLogRecordStore::new();
/// assert_eq!(store.len(), 0);
/// ```
pub struct InMemoryLogRecordStore {
    rows: RwLock<HashMap<Uuid, LogRecord>>,
    /// When set, every write fails (for exercising failure paths)
    fail_writes: AtomicBool,
}

impl InMemoryLogRecordStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Snapshot of every row, oldest first
    pub fn all(&self) -> Vec<LogRecord> {
        let mut rows: Vec<LogRecord> = self.rows.read().values().cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.log_id.cmp(&b.log_id)));
        rows
    }

    /// Make subsequent writes fail with a database error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("writes disabled".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryLogRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogRecordStore for InMemoryLogRecordStore {
    async fn find_duplicate(&self, key: &DedupKey) -> Result<Option<Uuid>, StoreError> {
        let rows = self.rows.read();
        Ok(rows
            .values()
            .find(|row| row.dedup_key() == *key)
            .map(|row| row.log_id))
    }

    async fn insert(&self, record: NewLogRecord) -> Result<LogRecord, StoreError> {
        self.check_writable()?;
        let row = record.into_record(Uuid::now_v7());
        self.rows.write().insert(row.log_id, row.clone());
        Ok(row)
    }

    async fn insert_batch(&self, records: Vec<NewLogRecord>) -> Result<usize, StoreError> {
        self.check_writable()?;
        let count = records.len();
        let mut rows = self.rows.write();
        for record in records {
            let row = record.into_record(Uuid::now_v7());
            rows.insert(row.log_id, row);
        }
        Ok(count)
    }

    async fn get(&self, log_id: Uuid) -> Result<LogRecord, StoreError> {
        self.rows
            .read()
            .get(&log_id)
            .cloned()
            .ok_or(StoreError::NotFound(log_id))
    }

    async fn list(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Vec<LogRecord>, StoreError> {
        let mut rows: Vec<LogRecord> = self
            .rows
            .read()
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.log_id.cmp(&a.log_id)));
        Ok(rows
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn count(&self, filter: &LogFilter) -> Result<u64, StoreError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| filter.matches(row))
            .count() as u64)
    }

    async fn mark_fixed(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.write();
        let mut updated = 0;
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.is_fixed = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn mark_read(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.write();
        let mut updated = 0;
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.write();
        Ok(ids.iter().filter(|id| rows.remove(id).is_some()).count() as u64)
    }

    async fn delete_read(&self) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, row| !row.is_read);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.write();
        let count = rows.len() as u64;
        rows.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campuslog_core::{EncodedRecord, LogStatus, RecordOrigin};

    fn row(message: &str, timestamp: &str, level: &str) -> NewLogRecord {
        let line = format!(
            r#"{{"timestamp":"{timestamp}","level":"{level}","action":"CREATE","message":"{message}"}}"#
        );
        NewLogRecord::from_encoded(&EncodedRecord::decode(&line).unwrap(), RecordOrigin::Import)
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_duplicate() {
        let store = InMemoryLogRecordStore::new();
        let inserted = store
            .insert(row("CREATE FAILED", "2025-01-01 10:00:00.100", "ERROR"))
            .await
            .unwrap();

        let same_second = row("CREATE FAILED", "2025-01-01 10:00:00.900", "ERROR");
        assert_eq!(
            store.find_duplicate(&same_second.dedup_key()).await.unwrap(),
            Some(inserted.log_id)
        );

        let next_second = row("CREATE FAILED", "2025-01-01 10:00:01.000", "ERROR");
        assert_eq!(store.find_duplicate(&next_second.dedup_key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_operator_mutations() {
        let store = InMemoryLogRecordStore::new();
        let a = store.insert(row("a FAILED", "2025-01-01 10:00:00", "ERROR")).await.unwrap();
        let b = store.insert(row("b FAILED", "2025-01-01 10:00:01", "ERROR")).await.unwrap();
        let c = store.insert(row("c FAILED", "2025-01-01 10:00:02", "ERROR")).await.unwrap();

        assert_eq!(store.mark_fixed(&[a.log_id, Uuid::now_v7()]).await.unwrap(), 1);
        assert!(store.get(a.log_id).await.unwrap().is_fixed);

        assert_eq!(store.mark_read(&[b.log_id]).await.unwrap(), 1);
        assert_eq!(store.delete_read().await.unwrap(), 1);
        assert!(matches!(store.get(b.log_id).await, Err(StoreError::NotFound(_))));

        assert_eq!(store.delete_ids(&[c.log_id]).await.unwrap(), 1);
        assert_eq!(store.delete_all().await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_pages_newest_first() {
        let store = InMemoryLogRecordStore::new();
        for second in 0..5 {
            store
                .insert(row(&format!("e{second} FAILED"), &format!("2025-01-01 10:00:0{second}"), "ERROR"))
                .await
                .unwrap();
        }
        store.insert(row("fine", "2025-01-01 10:00:09", "INFO")).await.unwrap();

        let errors = store
            .list(&LogFilter::errors(), Pagination { offset: 1, limit: 2 })
            .await
            .unwrap();
        let messages: Vec<&str> = errors.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["e3 FAILED", "e2 FAILED"]);

        assert_eq!(store.count(&LogFilter::errors()).await.unwrap(), 5);
        let info = LogFilter {
            status: Some(LogStatus::Info),
            ..Default::default()
        };
        assert_eq!(store.count(&info).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = InMemoryLogRecordStore::new();
        store.set_fail_writes(true);
        let result = store
            .insert_batch(vec![row("x FAILED", "2025-01-01 10:00:00", "ERROR")])
            .await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
