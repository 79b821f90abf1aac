//! Line codec for the date-partitioned log files
//!
//! One JSON object per line:
//!
//! ```text
//! {"timestamp":"2025-01-01 10:00:00.000","level":"ERROR","action":"CREATE","message":"...","user_id":null,"endpoint":null,"data":{}}
//! ```
//!
//! Encoding is canonical (field order and formatting are fixed). Decoding is
//! lenient: files written by older releases omit fields, use icons for the
//! level, or store numeric user ids.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::event::{Event, Severity};

/// Timestamp layout written to files
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const ACCEPTED_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// The file-resident form of an [`Event`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedRecord {
    pub timestamp: String,
    pub level: String,
    #[serde(default)]
    pub action: String,
    pub message: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

impl EncodedRecord {
    /// Build the record for an event
    pub fn from_event(event: &Event) -> Self {
        Self {
            timestamp: format_timestamp(event.occurred_at),
            level: event.severity.as_str().to_string(),
            action: event.action.clone(),
            message: event.message.clone(),
            user_id: event.user_id.clone(),
            endpoint: event.endpoint.clone(),
            data: event.data.clone(),
        }
    }

    /// Parse one line. Trailing whitespace (including the newline) is ignored.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.trim_end();
        if line.is_empty() {
            return Err(CoreError::MalformedRecord("empty line".into()));
        }
        serde_json::from_str(line).map_err(|e| CoreError::MalformedRecord(e.to_string()))
    }

    /// Serialize to a single line without the trailing newline
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parsed severity, if the level is a known token or icon
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(&self.level)
    }

    /// Parsed event timestamp
    pub fn occurred_at(&self) -> Result<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Encode an event straight to a newline-terminated line
pub fn encode_line(event: &Event) -> Result<String> {
    let mut line = EncodedRecord::from_event(event).encode()?;
    line.push('\n');
    Ok(line)
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    ACCEPTED_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| CoreError::InvalidTimestamp(raw.to_string()))
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    })
}
