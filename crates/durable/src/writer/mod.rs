//! Durable file writer and the partitioned log directory
//!
//! This module provides:
//! - [`EventWriter`] - dedicated-thread appender, never drops a line
//! - [`LogDirectory`] - naming, listing and inspection of `app_<date>.log` files

mod directory;
mod file_writer;

pub use directory::{DirectoryError, FileInfo, LogDirectory, PartitionFile};
pub use file_writer::{EventWriter, WriterConfig, WriterError, WriterStats, WriterStatsSnapshot};
