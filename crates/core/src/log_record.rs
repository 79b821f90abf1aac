//! Relational error-index rows and the mapping that produces them
//!
//! Both promotion paths (live enrichment and batch import) go through
//! [`NewLogRecord::from_encoded`], so a given event always maps to the same
//! row shape and the same [`DedupKey`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::{classify_with_level, LogStatus};
use crate::clock::truncate_to_second;
use crate::error::Result;
use crate::extract::{extract_fields, ExtractionInput};
use crate::record::EncodedRecord;

/// Number of message characters compared by the dedup check
pub const DEDUP_MESSAGE_PREFIX_CHARS: usize = 100;

/// Which promotion path produced a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Synchronous insert from the HTTP error boundary
    Direct,
    /// Background enrichment worker
    Enrichment,
    /// Batch importer
    Import,
}

impl RecordOrigin {
    /// Only direct-path rows start out read
    pub fn marks_read(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

/// A row ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogRecord {
    pub user_id: Option<String>,
    pub user_type: Option<String>,
    pub action: String,
    pub message: String,
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub is_read: bool,
    /// When the originating event occurred
    pub created_at: NaiveDateTime,
}

impl NewLogRecord {
    /// Classify and map one decoded line into a row.
    ///
    /// Fails only when the embedded timestamp cannot be parsed.
    pub fn from_encoded(record: &EncodedRecord, origin: RecordOrigin) -> Result<Self> {
        let created_at = record.occurred_at()?;
        let classification =
            classify_with_level(record.severity(), &record.action, &record.message);
        let is_error = classification.status == LogStatus::Error;

        let fields = extract_fields(ExtractionInput {
            canonical_action: &classification.action,
            is_error,
            message: &record.message,
            user_id: record.user_id.as_deref(),
            endpoint: record.endpoint.as_deref(),
            data: &record.data,
        });

        let row = Self {
            user_id: record.user_id.clone(),
            user_type: fields.user_type,
            action: classification.action,
            message: record.message.clone(),
            table_name: fields.table_name,
            record_id: fields.record_id,
            old_values: fields.old_values,
            new_values: fields.new_values,
            ip_address: fields.ip_address,
            user_agent: fields.user_agent,
            status: classification.status,
            error_message: fields.error_message,
            is_read: origin.marks_read(),
            created_at,
        };
        Ok(row.without_nul())
    }

    /// NUL is legal in a JSON string but not in a database text column
    fn without_nul(mut self) -> Self {
        strip_nul(&mut self.message);
        strip_nul(&mut self.action);
        for field in [
            &mut self.user_id,
            &mut self.user_type,
            &mut self.table_name,
            &mut self.record_id,
            &mut self.old_values,
            &mut self.new_values,
            &mut self.ip_address,
            &mut self.user_agent,
            &mut self.error_message,
        ] {
            if let Some(value) = field {
                strip_nul(value);
            }
        }
        self
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.message, self.created_at, self.status)
    }

    /// Materialize the row with a fresh id
    pub fn into_record(self, log_id: Uuid) -> LogRecord {
        LogRecord {
            log_id,
            user_id: self.user_id,
            user_type: self.user_type,
            action: self.action,
            message: self.message,
            table_name: self.table_name,
            record_id: self.record_id,
            old_values: self.old_values,
            new_values: self.new_values,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            status: self.status,
            error_message: self.error_message,
            is_fixed: false,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

/// A persisted row of the error index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub log_id: Uuid,
    pub user_id: Option<String>,
    pub user_type: Option<String>,
    pub action: String,
    pub message: String,
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub is_fixed: bool,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

impl LogRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.message, self.created_at, self.status)
    }
}

/// (message prefix, one-second bucket, status)
///
/// A heuristic: two legitimately distinct errors with the same message
/// prefix in the same second collapse into one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub message_prefix: String,
    pub bucket: NaiveDateTime,
    pub status: LogStatus,
}

impl DedupKey {
    pub fn new(message: &str, created_at: NaiveDateTime, status: LogStatus) -> Self {
        Self {
            message_prefix: message_prefix(message),
            bucket: truncate_to_second(created_at),
            status,
        }
    }

    /// Exclusive upper bound of the bucket
    pub fn bucket_end(&self) -> NaiveDateTime {
        self.bucket + chrono::Duration::seconds(1)
    }
}

pub fn message_prefix(message: &str) -> String {
    message.chars().take(DEDUP_MESSAGE_PREFIX_CHARS).collect()
}

fn strip_nul(value: &mut String) {
    if value.contains('\0') {
        value.retain(|c| c != '\0');
    }
}
