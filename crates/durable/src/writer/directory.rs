//! The partitioned log directory
//!
//! Knows how partition files are named and where they live. Everything
//! that is not an `app_<YYYY-MM-DD>.log` regular file is invisible here,
//! so neither the importer nor the retention manager can touch it.

use std::path::{Path, PathBuf};

use campuslog_core::{partition_date, partition_file_name};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncReadExt;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("log directory does not exist: {0}")]
    Missing(PathBuf),

    #[error("not a log partition file name: {0}")]
    NotPartition(String),

    #[error("log file not found: {0}")]
    FileNotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DirectoryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One partition file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFile {
    pub name: String,
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// Operator-facing description of a partition file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub date: NaiveDate,
    pub size_bytes: u64,
    pub line_count: u64,
    pub modified: Option<NaiveDateTime>,
}

/// Root directory holding the daily partition files
#[derive(Debug, Clone)]
pub struct LogDirectory {
    root: PathBuf,
}

impl LogDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the partition file for a calendar day
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.root.join(partition_file_name(date))
    }

    /// Create the directory if needed (blocking; used by the writer thread)
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Every partition file in the directory, oldest first
    pub async fn partition_files(&self) -> Result<Vec<PartitionFile>, DirectoryError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DirectoryError::Missing(self.root.clone()))
            }
            Err(e) => return Err(DirectoryError::io(&self.root, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DirectoryError::io(&self.root, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(date) = partition_date(&name) else {
                continue;
            };
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                files.push(PartitionFile {
                    name,
                    date,
                    path: entry.path(),
                });
            }
        }

        files.sort_by_key(|f| f.date);
        Ok(files)
    }

    /// Look up one partition file by name
    pub async fn resolve(&self, name: &str) -> Result<PartitionFile, DirectoryError> {
        let date = partition_date(name).ok_or_else(|| DirectoryError::NotPartition(name.to_string()))?;
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(DirectoryError::Missing(self.root.clone()));
        }
        let path = self.root.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(PartitionFile {
                name: name.to_string(),
                date,
                path,
            }),
            Ok(_) => Err(DirectoryError::FileNotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DirectoryError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(DirectoryError::io(&path, e)),
        }
    }

    /// Partition file for `date`, if it exists
    pub async fn find(&self, date: NaiveDate) -> Result<Option<PartitionFile>, DirectoryError> {
        match self.resolve(&partition_file_name(date)).await {
            Ok(file) => Ok(Some(file)),
            Err(DirectoryError::FileNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Size, line count and modification time of a partition file
    pub async fn file_info(&self, file: &PartitionFile) -> Result<FileInfo, DirectoryError> {
        let meta = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| DirectoryError::io(&file.path, e))?;
        let modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Local>::from(t).naive_local());

        Ok(FileInfo {
            name: file.name.clone(),
            date: file.date,
            size_bytes: meta.len(),
            line_count: count_lines(&file.path).await?,
            modified,
        })
    }

    /// [`FileInfo`] for every partition file, oldest first
    pub async fn list_info(&self) -> Result<Vec<FileInfo>, DirectoryError> {
        let mut infos = Vec::new();
        for file in self.partition_files().await? {
            infos.push(self.file_info(&file).await?);
        }
        Ok(infos)
    }
}

/// Count newline-terminated lines, plus a trailing partial line if any
async fn count_lines(path: &Path) -> Result<u64, DirectoryError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DirectoryError::io(path, e))?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut lines = 0u64;
    let mut last = b'\n';

    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| DirectoryError::io(path, e))?;
        if read == 0 {
            break;
        }
        lines += buf[..read].iter().filter(|b| **b == b'\n').count() as u64;
        last = buf[read - 1];
    }

    if last != b'\n' {
        lines += 1;
    }
    Ok(lines)
}
