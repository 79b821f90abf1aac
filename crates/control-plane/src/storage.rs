// Store selection
// Decision: Support both PostgreSQL (production) and in-memory (dev mode)
//
// Without DATABASE_URL the server runs against an in-memory index; rows are
// lost on restart but can be rebuilt from the files with an import.

use std::sync::Arc;

use anyhow::{Context, Result};
use campuslog_durable::{InMemoryLogRecordStore, LogRecordStore, PostgresLogRecordStore};

/// Open the error-index store, applying migrations for PostgreSQL
pub async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn LogRecordStore>> {
    match database_url.filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            let store = PostgresLogRecordStore::connect(url)
                .await
                .context("Failed to connect to database")?;
            store
                .migrate()
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Connected to database");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory log store (dev mode)");
            Ok(Arc::new(InMemoryLogRecordStore::new()))
        }
    }
}
