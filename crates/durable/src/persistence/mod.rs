//! Persistence layer for the relational error index
//!
//! This module provides:
//! - [`LogRecordStore`] trait for row persistence and dedup lookups
//! - [`InMemoryLogRecordStore`] for tests and dev mode
//! - [`PostgresLogRecordStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryLogRecordStore;
pub use postgres::PostgresLogRecordStore;
pub use store::{LogFilter, LogRecordStore, Pagination, StoreError};
