//! Durable append-only event writer
//!
//! A dedicated OS thread owns the open partition file. Callers encode
//! their event and hand the line over a bounded channel; when the channel
//! is full they wait for capacity instead of dropping the line. The thread
//! drains whatever is queued, appends each line with a single write and
//! syncs once per drained batch.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use campuslog_core::{encode_line, Clock, Event};
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::directory::LogDirectory;
use crate::reliability::RetryPolicy;

/// Writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Capacity of the line queue feeding the writer thread
    pub queue_capacity: usize,

    /// Upper bound on lines appended between two syncs
    pub max_batch: usize,

    /// Backoff applied to failed appends (retried until they succeed)
    pub retry: RetryPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            max_batch: 512,
            retry: RetryPolicy::unbounded(
                std::time::Duration::from_millis(50),
                std::time::Duration::from_secs(5),
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to spawn writer thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("writer thread panicked")]
    Panicked,
}

/// Counters exposed by the writer
#[derive(Debug, Default)]
pub struct WriterStats {
    lines_written: AtomicU64,
    batches_synced: AtomicU64,
    io_retries: AtomicU64,
    fallback_writes: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStatsSnapshot {
    pub lines_written: u64,
    pub batches_synced: u64,
    pub io_retries: u64,
    pub fallback_writes: u64,
}

impl WriterStats {
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            lines_written: self.lines_written.load(Ordering::Relaxed),
            batches_synced: self.batches_synced.load(Ordering::Relaxed),
            io_retries: self.io_retries.load(Ordering::Relaxed),
            fallback_writes: self.fallback_writes.load(Ordering::Relaxed),
        }
    }
}

enum WriterCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Appends encoded events to today's partition file
///
/// # Example
///
/// ```ignore
/// let writer = EventWriter::start(LogDirectory::new("logs"), clock, WriterConfig::default())?;
/// writer.record(&event).await;
/// writer.shutdown().await?;
/// ```
pub struct EventWriter {
    directory: LogDirectory,
    clock: Arc<dyn Clock>,
    sender: RwLock<Option<mpsc::Sender<WriterCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<WriterStats>,
}

impl EventWriter {
    /// Spawn the writer thread
    pub fn start(
        directory: LogDirectory,
        clock: Arc<dyn Clock>,
        config: WriterConfig,
    ) -> Result<Self, WriterError> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(WriterStats::default());

        let worker = WriterThread {
            directory: directory.clone(),
            clock: Arc::clone(&clock),
            retry: config.retry,
            max_batch: config.max_batch.max(1),
            stats: Arc::clone(&stats),
            current: None,
        };

        let handle = std::thread::Builder::new()
            .name("campuslog-writer".into())
            .spawn(move || worker.run(rx))
            .map_err(WriterError::Spawn)?;

        info!(dir = %directory.root().display(), "event writer started");

        Ok(Self {
            directory,
            clock,
            sender: RwLock::new(Some(tx)),
            thread: Mutex::new(Some(handle)),
            stats,
        })
    }

    /// Record one event. Never fails from the caller's point of view.
    pub async fn record(&self, event: &Event) {
        let line = match encode_line(event) {
            Ok(line) => line,
            Err(e) => {
                error!(action = %event.action, "failed to encode event: {}", e);
                return;
            }
        };

        let sender = self.sender.read().clone();
        let line = match sender {
            Some(tx) => match tx.send(WriterCommand::Line(line)).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(WriterCommand::Line(line))) => line,
                Err(_) => return,
            },
            None => line,
        };

        self.append_inline(line).await;
    }

    /// Wait until every previously recorded event is on disk
    pub async fn flush(&self) {
        let Some(tx) = self.sender.read().clone() else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(WriterCommand::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Drain the queue, sync and join the writer thread.
    ///
    /// Later `record` calls still succeed through the inline fallback.
    pub async fn shutdown(&self) -> Result<(), WriterError> {
        let sender = self.sender.write().take();
        drop(sender);

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|_| WriterError::Panicked)?
                .map_err(|_| WriterError::Panicked)?;
            info!("event writer stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sender.read().is_some()
    }

    pub fn stats(&self) -> WriterStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn directory(&self) -> &LogDirectory {
        &self.directory
    }

    /// Path of the file a record made now would land in
    pub fn today_path(&self) -> PathBuf {
        self.directory.path_for(self.clock.today())
    }

    async fn append_inline(&self, line: String) {
        let path = self.today_path();
        let directory = self.directory.clone();
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            directory.ensure_exists()?;
            let mut file = open_append(&path)?;
            file.write_all(line.as_bytes())?;
            file.sync_data()
        })
        .await;

        match result {
            Ok(Ok(())) => {
                self.stats.fallback_writes.fetch_add(1, Ordering::Relaxed);
                self.stats.lines_written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => error!("inline log append failed: {}", e),
            Err(e) => error!("inline log append task failed: {}", e),
        }
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain and exit on its own
        self.sender.write().take();
    }
}

struct OpenPartition {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

struct WriterThread {
    directory: LogDirectory,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    max_batch: usize,
    stats: Arc<WriterStats>,
    current: Option<OpenPartition>,
}

impl WriterThread {
    fn run(mut self, mut rx: mpsc::Receiver<WriterCommand>) {
        while let Some(first) = rx.blocking_recv() {
            let mut lines = Vec::new();
            let mut waiters = Vec::new();
            let mut next = Some(first);

            while let Some(command) = next.take() {
                match command {
                    WriterCommand::Line(line) => lines.push(line),
                    WriterCommand::Flush(ack) => waiters.push(ack),
                }
                if lines.len() < self.max_batch {
                    next = rx.try_recv().ok();
                }
            }

            if !lines.is_empty() {
                self.write_batch(&lines);
            }
            for ack in waiters {
                let _ = ack.send(());
            }
        }

        debug!("writer channel closed, thread exiting");
    }

    /// Append every line, retrying from the first unwritten one until done
    fn write_batch(&mut self, lines: &[String]) {
        let mut written = 0;
        let mut attempt = 1;

        while written < lines.len() {
            match self.append_from(lines, &mut written) {
                Ok(()) => {}
                Err(e) => {
                    attempt += 1;
                    self.stats.io_retries.fetch_add(1, Ordering::Relaxed);
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        pending = lines.len() - written,
                        delay_ms = delay.as_millis() as u64,
                        "log append failed, retrying: {}",
                        e
                    );
                    self.current = None;
                    std::thread::sleep(delay);
                }
            }
        }

        if let Some(open) = &self.current {
            if let Err(e) = open.file.sync_data() {
                warn!(path = %open.path.display(), "sync failed: {}", e);
            }
        }
        self.stats
            .lines_written
            .fetch_add(lines.len() as u64, Ordering::Relaxed);
        self.stats.batches_synced.fetch_add(1, Ordering::Relaxed);
    }

    fn append_from(&mut self, lines: &[String], written: &mut usize) -> std::io::Result<()> {
        let file = self.file_for_today()?;
        for line in &lines[*written..] {
            file.write_all(line.as_bytes())?;
            *written += 1;
        }
        Ok(())
    }

    /// Open (or reopen) today's file; rolls over at midnight and recovers
    /// from the file being deleted underneath us
    fn file_for_today(&mut self) -> std::io::Result<&mut File> {
        let today = self.clock.today();
        let stale = match &self.current {
            Some(open) => open.date != today || !open.path.exists(),
            None => true,
        };

        if stale {
            self.directory.ensure_exists()?;
            let path = self.directory.path_for(today);
            let file = open_append(&path)?;
            debug!(path = %path.display(), "opened log partition");
            self.current = Some(OpenPartition {
                date: today,
                path,
                file,
            });
        }

        match self.current.as_mut() {
            Some(open) => Ok(&mut open.file),
            None => Err(std::io::Error::other("no open log partition")),
        }
    }
}

/// Open for appending. A file whose last line was cut short (failed write,
/// crash) gets a newline first, so the fragment stays on a line of its own
/// and the next line is written whole.
fn open_append(path: &std::path::Path) -> std::io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    if file.metadata()?.len() > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!(path = %path.display(), "log partition ends mid-line, sealing fragment");
            file.write_all(b"\n")?;
        }
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use campuslog_core::{EncodedRecord, FixedClock, Severity};
    use chrono::NaiveDateTime;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn event(n: usize) -> Event {
        Event::at(at("2025-01-01 10:00:00"), Severity::Info, "READ", format!("event {n}")).build()
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_every_record_lands_once() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(at("2025-01-01 10:00:00")));
        let config = WriterConfig {
            queue_capacity: 4,
            max_batch: 3,
            ..Default::default()
        };
        let writer = EventWriter::start(LogDirectory::new(dir.path()), clock, config).unwrap();

        for n in 0..50 {
            writer.record(&event(n)).await;
        }
        writer.shutdown().await.unwrap();

        let lines = read_lines(&dir.path().join("app_2025-01-01.log"));
        assert_eq!(lines.len(), 50);
        for (n, line) in lines.iter().enumerate() {
            let record = EncodedRecord::decode(line).unwrap();
            assert_eq!(record.message, format!("event {n}"));
        }
        assert_eq!(writer.stats().lines_written, 50);
    }

    #[tokio::test]
    async fn test_flush_makes_lines_visible() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(at("2025-01-01 10:00:00")));
        let writer =
            EventWriter::start(LogDirectory::new(dir.path()), clock, WriterConfig::default()).unwrap();

        writer.record(&event(1)).await;
        writer.flush().await;
        assert_eq!(read_lines(&writer.today_path()).len(), 1);
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_midnight_rollover_opens_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(at("2025-01-01 23:59:59")));
        let writer = EventWriter::start(
            LogDirectory::new(dir.path()),
            clock.clone(),
            WriterConfig::default(),
        )
        .unwrap();

        writer.record(&event(1)).await;
        writer.flush().await;
        clock.set(at("2025-01-02 00:00:01"));
        writer.record(&event(2)).await;
        writer.shutdown().await.unwrap();

        assert_eq!(read_lines(&dir.path().join("app_2025-01-01.log")).len(), 1);
        assert_eq!(read_lines(&dir.path().join("app_2025-01-02.log")).len(), 1);
    }

    #[tokio::test]
    async fn test_reopens_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(at("2025-01-01 10:00:00")));
        let writer =
            EventWriter::start(LogDirectory::new(dir.path()), clock, WriterConfig::default()).unwrap();

        writer.record(&event(1)).await;
        writer.flush().await;
        std::fs::remove_file(writer.today_path()).unwrap();

        writer.record(&event(2)).await;
        writer.shutdown().await.unwrap();

        let lines = read_lines(&dir.path().join("app_2025-01-01.log"));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("event 2"));
    }

    #[tokio::test]
    async fn test_records_after_shutdown_fall_back_inline() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(at("2025-01-01 10:00:00")));
        let writer =
            EventWriter::start(LogDirectory::new(dir.path()), clock, WriterConfig::default()).unwrap();

        writer.shutdown().await.unwrap();
        assert!(!writer.is_running());
        writer.record(&event(7)).await;

        let lines = read_lines(&dir.path().join("app_2025-01-01.log"));
        assert_eq!(lines.len(), 1);
        assert_eq!(writer.stats().fallback_writes, 1);
    }

    #[tokio::test]
    async fn test_cut_short_line_is_sealed_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let complete = encode_line(&event(0)).unwrap();
        std::fs::write(
            dir.path().join("app_2025-01-01.log"),
            format!("{complete}{{\"timestamp\":\"20"),
        )
        .unwrap();
        let clock = Arc::new(FixedClock::new(at("2025-01-01 10:00:00")));
        let writer =
            EventWriter::start(LogDirectory::new(dir.path()), clock, WriterConfig::default()).unwrap();

        writer.record(&event(1)).await;
        writer.shutdown().await.unwrap();

        let lines = read_lines(&dir.path().join("app_2025-01-01.log"));
        assert_eq!(lines.len(), 3);
        assert_eq!(EncodedRecord::decode(&lines[0]).unwrap().message, "event 0");
        assert!(EncodedRecord::decode(&lines[1]).is_err());
        assert_eq!(EncodedRecord::decode(&lines[2]).unwrap().message, "event 1");
    }

    #[tokio::test]
    async fn test_failed_open_is_retried_until_it_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("logs");
        // A regular file where the directory should be makes every open fail
        std::fs::write(&root, "occupied").unwrap();
        let clock = Arc::new(FixedClock::new(at("2025-01-01 10:00:00")));
        let config = WriterConfig {
            retry: RetryPolicy::unbounded(
                std::time::Duration::from_millis(5),
                std::time::Duration::from_millis(20),
            ),
            ..Default::default()
        };
        let writer = EventWriter::start(LogDirectory::new(&root), clock, config).unwrap();

        writer.record(&event(1)).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        std::fs::remove_file(&root).unwrap();
        writer.flush().await;

        let stats = writer.stats();
        assert!(stats.io_retries > 0);
        assert_eq!(stats.lines_written, 1);
        let lines = read_lines(&root.join("app_2025-01-01.log"));
        assert_eq!(lines.len(), 1);
        assert_eq!(EncodedRecord::decode(&lines[0]).unwrap().message, "event 1");
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("logs");
        let clock = Arc::new(FixedClock::new(at("2025-01-01 10:00:00")));
        let writer =
            EventWriter::start(LogDirectory::new(&root), clock, WriterConfig::default()).unwrap();

        writer.record(&event(1)).await;
        writer.shutdown().await.unwrap();
        assert!(root.join("app_2025-01-01.log").exists());
    }
}
