//! Batch importer / reconciler
//!
//! Rebuilds the relational error index from the partition files. Each file
//! is streamed line by line, mapped exactly like live enrichment, deduped
//! against the store and against rows already pending for the same file,
//! then committed in one transaction. Running it twice is a no-op the
//! second time.

use std::collections::HashSet;
use std::sync::Arc;

use campuslog_core::{Clock, DedupKey, EncodedRecord, NewLogRecord, RecordOrigin, Severity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::persistence::{LogRecordStore, StoreError};
use crate::writer::{DirectoryError, LogDirectory, PartitionFile};

/// Which files to import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "file", rename_all = "snake_case")]
pub enum ImportTarget {
    All,
    Today,
    /// One partition file by name, e.g. `app_2025-01-01.log`
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Only import lines whose level is ERROR
    pub error_only: bool,

    /// Cap on rows inserted per file
    pub per_file_limit: Option<usize>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            error_only: true,
            per_file_limit: None,
        }
    }
}

impl ImportOptions {
    pub fn errors() -> Self {
        Self::default()
    }

    /// Every decodable line, with its classified status
    pub fn everything() -> Self {
        Self {
            error_only: false,
            per_file_limit: None,
        }
    }

    pub fn with_per_file_limit(mut self, limit: Option<usize>) -> Self {
        self.per_file_limit = limit;
        self
    }
}

/// Outcome for a single file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileImportResult {
    pub file: String,
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub duplicates: u64,
    pub records_imported: u64,
    /// Set when the file was rolled back
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub files_processed: u64,
    pub records_imported: u64,
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub duplicates: u64,
    pub files_failed: u64,
    /// Cancellation was observed before every file was processed
    pub cancelled: bool,
    pub files: Vec<FileImportResult>,
}

impl ImportSummary {
    fn absorb(&mut self, result: FileImportResult) {
        self.lines_read += result.lines_read;
        self.lines_skipped += result.lines_skipped;
        self.duplicates += result.duplicates;
        if result.error.is_some() {
            self.files_failed += 1;
        } else {
            self.files_processed += 1;
            self.records_imported += result.records_imported;
        }
        self.files.push(result);
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Failure that rolls back one file
#[derive(Debug, Error)]
enum FileError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reconciles partition files into the store
pub struct Importer {
    store: Arc<dyn LogRecordStore>,
    directory: LogDirectory,
    clock: Arc<dyn Clock>,
}

impl Importer {
    pub fn new(
        store: Arc<dyn LogRecordStore>,
        directory: LogDirectory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
        }
    }

    /// Import the target files, one transaction per file.
    ///
    /// Per-file failures are reported in the summary, not returned; only a
    /// missing directory or an unknown file name is an error.
    #[instrument(skip(self, cancel))]
    pub async fn import(
        &self,
        target: &ImportTarget,
        options: &ImportOptions,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        let files = match target {
            ImportTarget::All => self.directory.partition_files().await?,
            ImportTarget::Today => self
                .directory
                .find(self.clock.today())
                .await?
                .into_iter()
                .collect(),
            ImportTarget::File(name) => vec![self.directory.resolve(name).await?],
        };

        let mut summary = ImportSummary::default();
        for file in &files {
            if cancel.is_cancelled() {
                info!(
                    processed = summary.files.len(),
                    remaining = files.len() - summary.files.len(),
                    "import cancelled"
                );
                summary.cancelled = true;
                break;
            }
            summary.absorb(self.import_file(file, options).await);
        }

        info!(
            files_processed = summary.files_processed,
            records_imported = summary.records_imported,
            duplicates = summary.duplicates,
            lines_skipped = summary.lines_skipped,
            files_failed = summary.files_failed,
            "import finished"
        );
        Ok(summary)
    }

    async fn import_file(&self, file: &PartitionFile, options: &ImportOptions) -> FileImportResult {
        let mut result = FileImportResult {
            file: file.name.clone(),
            ..Default::default()
        };

        match self.collect_rows(file, options, &mut result).await {
            Ok(rows) if rows.is_empty() => {}
            Ok(rows) => match self.store.insert_batch(rows).await {
                Ok(inserted) => result.records_imported = inserted as u64,
                Err(e) => {
                    warn!(file = %file.name, "import rolled back: {}", e);
                    result.error = Some(e.to_string());
                }
            },
            Err(e) => {
                warn!(file = %file.name, "import of file failed: {}", e);
                result.error = Some(e.to_string());
            }
        }

        debug!(
            file = %file.name,
            imported = result.records_imported,
            duplicates = result.duplicates,
            skipped = result.lines_skipped,
            "file imported"
        );
        result
    }

    /// Stream one file into the rows that should be inserted
    async fn collect_rows(
        &self,
        file: &PartitionFile,
        options: &ImportOptions,
        result: &mut FileImportResult,
    ) -> Result<Vec<NewLogRecord>, FileError> {
        let handle = tokio::fs::File::open(&file.path).await?;
        let mut reader = BufReader::new(handle);
        let mut buf = Vec::new();
        let mut pending: Vec<NewLogRecord> = Vec::new();
        let mut pending_keys: HashSet<DedupKey> = HashSet::new();

        loop {
            if options
                .per_file_limit
                .is_some_and(|limit| pending.len() >= limit)
            {
                break;
            }

            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let Ok(line) = std::str::from_utf8(&buf) else {
                result.lines_read += 1;
                result.lines_skipped += 1;
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            result.lines_read += 1;

            let record = match EncodedRecord::decode(line) {
                Ok(record) => record,
                Err(e) => {
                    debug!(file = %file.name, line = result.lines_read, "skipping line: {}", e);
                    result.lines_skipped += 1;
                    continue;
                }
            };

            if options.error_only && record.severity() != Some(Severity::Error) {
                continue;
            }

            let row = match NewLogRecord::from_encoded(&record, RecordOrigin::Import) {
                Ok(row) => row,
                Err(e) => {
                    debug!(file = %file.name, line = result.lines_read, "skipping line: {}", e);
                    result.lines_skipped += 1;
                    continue;
                }
            };

            let key = row.dedup_key();
            if pending_keys.contains(&key) || self.store.find_duplicate(&key).await?.is_some() {
                result.duplicates += 1;
                continue;
            }

            pending_keys.insert(key);
            pending.push(row);
        }

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryLogRecordStore;
    use campuslog_core::{FixedClock, LogStatus};
    use chrono::NaiveDateTime;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn line(ts: &str, level: &str, message: &str) -> String {
        format!(
            r#"{{"timestamp":"{ts}","level":"{level}","action":"CREATE","message":"{message}","user_id":null,"endpoint":null,"data":{{}}}}"#
        )
    }

    struct Fixture {
        dir: tempfile::TempDir,
        store: Arc<InMemoryLogRecordStore>,
        importer: Importer,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryLogRecordStore::new());
        let clock = Arc::new(FixedClock::new(at("2025-01-02 12:00:00")));
        let importer = Importer::new(store.clone(), LogDirectory::new(dir.path()), clock);
        Fixture {
            dir,
            store,
            importer,
        }
    }

    fn write(f: &Fixture, name: &str, lines: &[String]) {
        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(f.dir.path().join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_error_only_import_is_idempotent() {
        let f = fixture();
        write(
            &f,
            "app_2025-01-01.log",
            &[
                line("2025-01-01 10:00:00.000", "ERROR", "CREATE FAILED on fees"),
                line("2025-01-01 10:00:01.000", "INFO", "CREATE SUCCESS on fees"),
                line("2025-01-01 10:00:02.000", "ERROR", "UPDATE FAILED on fees"),
            ],
        );

        let cancel = CancellationToken::new();
        let first = f
            .importer
            .import(&ImportTarget::All, &ImportOptions::errors(), &cancel)
            .await
            .unwrap();
        assert_eq!(first.files_processed, 1);
        assert_eq!(first.records_imported, 2);

        let second = f
            .importer
            .import(&ImportTarget::All, &ImportOptions::errors(), &cancel)
            .await
            .unwrap();
        assert_eq!(second.records_imported, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(f.store.len(), 2);
        assert!(f.store.all().iter().all(|r| r.status == LogStatus::Error));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped_not_fatal() {
        let f = fixture();
        write(
            &f,
            "app_2025-01-01.log",
            &[
                "{not json".to_string(),
                line("not-a-time", "ERROR", "bad ts"),
                line("2025-01-01 10:00:00.000", "ERROR", "DELETE FAILED"),
            ],
        );

        let summary = f
            .importer
            .import(&ImportTarget::All, &ImportOptions::errors(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.lines_read, 3);
        assert_eq!(summary.lines_skipped, 2);
        assert_eq!(summary.records_imported, 1);
    }

    #[tokio::test]
    async fn test_same_second_duplicates_within_file() {
        let f = fixture();
        write(
            &f,
            "app_2025-01-01.log",
            &[
                line("2025-01-01 10:00:00.100", "ERROR", "CREATE FAILED"),
                line("2025-01-01 10:00:00.700", "ERROR", "CREATE FAILED"),
            ],
        );

        let summary = f
            .importer
            .import(&ImportTarget::All, &ImportOptions::errors(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.records_imported, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[tokio::test]
    async fn test_per_file_limit_and_full_reimport() {
        let f = fixture();
        write(
            &f,
            "app_2025-01-01.log",
            &[
                line("2025-01-01 10:00:00.000", "INFO", "READ students"),
                line("2025-01-01 10:00:01.000", "SUCCESS", "CREATE SUCCESS"),
                line("2025-01-01 10:00:02.000", "ERROR", "CREATE FAILED"),
            ],
        );

        let options = ImportOptions::everything().with_per_file_limit(Some(2));
        let summary = f
            .importer
            .import(&ImportTarget::All, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.records_imported, 2);

        let statuses: Vec<LogStatus> = f.store.all().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![LogStatus::Info, LogStatus::Success]);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_only_that_file() {
        let f = fixture();
        write(
            &f,
            "app_2025-01-01.log",
            &[line("2025-01-01 10:00:00.000", "ERROR", "a FAILED")],
        );
        f.store.set_fail_writes(true);

        let summary = f
            .importer
            .import(&ImportTarget::All, &ImportOptions::errors(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.records_imported, 0);
        assert!(summary.files[0].error.is_some());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_today_and_named_targets() {
        let f = fixture();
        write(&f, "app_2025-01-01.log", &[line("2025-01-01 10:00:00.000", "ERROR", "old FAILED")]);
        write(&f, "app_2025-01-02.log", &[line("2025-01-02 10:00:00.000", "ERROR", "new FAILED")]);

        let cancel = CancellationToken::new();
        let today = f
            .importer
            .import(&ImportTarget::Today, &ImportOptions::errors(), &cancel)
            .await
            .unwrap();
        assert_eq!(today.files[0].file, "app_2025-01-02.log");
        assert_eq!(today.records_imported, 1);

        let named = f
            .importer
            .import(
                &ImportTarget::File("app_2025-01-01.log".into()),
                &ImportOptions::errors(),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(named.records_imported, 1);

        let unknown = f
            .importer
            .import(&ImportTarget::File("app_2024-12-31.log".into()), &ImportOptions::errors(), &cancel)
            .await;
        assert!(matches!(
            unknown,
            Err(ImportError::Directory(DirectoryError::FileNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_between_files() {
        let f = fixture();
        write(&f, "app_2025-01-01.log", &[line("2025-01-01 10:00:00.000", "ERROR", "x FAILED")]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = f
            .importer
            .import(&ImportTarget::All, &ImportOptions::errors(), &cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.files_processed, 0);
        assert!(f.store.is_empty());
    }
}
