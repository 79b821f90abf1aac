//! PostgreSQL implementation of LogRecordStore
//!
//! Rows live in a single `log_records` table (see `migrations/`).
//! Batch inserts run inside one transaction so a file is either fully
//! promoted or not at all.

use async_trait::async_trait;
use campuslog_core::{DedupKey, LogRecord, LogStatus, NewLogRecord};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;

const COLUMNS: &str = "log_id, user_id, user_type, action, message, table_name, record_id, \
     old_values, new_values, ip_address, user_agent, status, error_message, is_fixed, is_read, \
     created_at";

/// PostgreSQL implementation of LogRecordStore
///
/// # Example
///
/// ```ignore
/// use campuslog_durable::PostgresLogRecordStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/campuslog").await?;
/// let store = PostgresLogRecordStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresLogRecordStore {
    pool: PgPool,
}

impl PostgresLogRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a default pool
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            error!("Failed to connect to database: {}", e);
            StoreError::Database(e.to_string())
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Database(e.to_string())
            })
    }
}

#[async_trait]
impl LogRecordStore for PostgresLogRecordStore {
    #[instrument(skip(self, key), fields(status = %key.status))]
    async fn find_duplicate(&self, key: &DedupKey) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT log_id FROM log_records
            WHERE status = $1
              AND created_at >= $2 AND created_at < $3
              AND LEFT(message, 100) = $4
            LIMIT 1
            "#,
        )
        .bind(key.status.as_str())
        .bind(key.bucket)
        .bind(key.bucket_end())
        .bind(&key.message_prefix)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to run dedup lookup: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(row.map(|r| r.get("log_id")))
    }

    #[instrument(skip(self, record))]
    async fn insert(&self, record: NewLogRecord) -> Result<LogRecord, StoreError> {
        let row = record.into_record(Uuid::now_v7());
        insert_row(&row)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to insert log record: {}", e);
                StoreError::Database(e.to_string())
            })?;

        debug!(log_id = %row.log_id, action = %row.action, "inserted log record");
        Ok(row)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn insert_batch(&self, records: Vec<NewLogRecord>) -> Result<usize, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let count = records.len();
        for record in records {
            let row = record.into_record(Uuid::now_v7());
            insert_row(&row).execute(&mut *tx).await.map_err(|e| {
                error!("Failed to insert log record in batch: {}", e);
                StoreError::Database(e.to_string())
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(count, "committed log record batch");
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn get(&self, log_id: Uuid) -> Result<LogRecord, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM log_records WHERE log_id = $1"
        ))
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get log record: {}", e);
            StoreError::Database(e.to_string())
        })?
        .ok_or(StoreError::NotFound(log_id))?;

        row_to_record(&row)
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Vec<LogRecord>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM log_records"));
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC, log_id DESC LIMIT ")
            .push_bind(pagination.limit as i64)
            .push(" OFFSET ")
            .push_bind(pagination.offset as i64);

        let rows = query.build().fetch_all(&self.pool).await.map_err(|e| {
            error!("Failed to list log records: {}", e);
            StoreError::Database(e.to_string())
        })?;

        rows.iter().map(row_to_record).collect()
    }

    #[instrument(skip(self))]
    async fn count(&self, filter: &LogFilter) -> Result<u64, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM log_records");
        push_filter(&mut query, filter);

        let row = query.build().fetch_one(&self.pool).await.map_err(|e| {
            error!("Failed to count log records: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(row.get::<i64, _>("count") as u64)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn mark_fixed(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE log_records SET is_fixed = TRUE WHERE log_id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to mark log records fixed: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn mark_read(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE log_records SET is_read = TRUE WHERE log_id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to mark log records read: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM log_records WHERE log_id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete log records: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn delete_read(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM log_records WHERE is_read = TRUE")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete read log records: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM log_records")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to clear log records: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(result.rows_affected())
    }
}

// Helper functions

fn insert_row(
    row: &LogRecord,
) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO log_records (
            log_id, user_id, user_type, action, message, table_name, record_id,
            old_values, new_values, ip_address, user_agent, status, error_message,
            is_fixed, is_read, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(row.log_id)
    .bind(&row.user_id)
    .bind(&row.user_type)
    .bind(&row.action)
    .bind(&row.message)
    .bind(&row.table_name)
    .bind(&row.record_id)
    .bind(&row.old_values)
    .bind(&row.new_values)
    .bind(&row.ip_address)
    .bind(&row.user_agent)
    .bind(row.status.as_str())
    .bind(&row.error_message)
    .bind(row.is_fixed)
    .bind(row.is_read)
    .bind(row.created_at)
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &LogFilter) {
    let mut separated = " WHERE ";
    let mut next = |query: &mut QueryBuilder<'_, Postgres>| {
        query.push(separated);
        separated = " AND ";
    };

    if let Some(status) = filter.status {
        next(query);
        query.push("status = ").push_bind(status.as_str().to_string());
    }
    if let Some(is_fixed) = filter.is_fixed {
        next(query);
        query.push("is_fixed = ").push_bind(is_fixed);
    }
    if let Some(is_read) = filter.is_read {
        next(query);
        query.push("is_read = ").push_bind(is_read);
    }
    if let Some(action) = &filter.action {
        next(query);
        query.push("action = ").push_bind(action.clone());
    }
    if let Some(table_name) = &filter.table_name {
        next(query);
        query.push("table_name = ").push_bind(table_name.clone());
    }
}

fn row_to_record(row: &PgRow) -> Result<LogRecord, StoreError> {
    let status: String = row.get("status");
    Ok(LogRecord {
        log_id: row.get("log_id"),
        user_id: row.get("user_id"),
        user_type: row.get("user_type"),
        action: row.get("action"),
        message: row.get("message"),
        table_name: row.get("table_name"),
        record_id: row.get("record_id"),
        old_values: row.get("old_values"),
        new_values: row.get("new_values"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        status: parse_status(&status)?,
        error_message: row.get("error_message"),
        is_fixed: row.get("is_fixed"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}

fn parse_status(status: &str) -> Result<LogStatus, StoreError> {
    LogStatus::parse(status)
        .ok_or_else(|| StoreError::Serialization(format!("Unknown log status: {}", status)))
}
