//! Event types
//!
//! An [`Event`] is built synchronously at a request/response/cache/database
//! call site, never mutated, and only ever persisted in serialized form.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::{truncate_to_millis, Clock};

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
    Debug,
    Critical,
}

impl Severity {
    /// Canonical token written to the `level` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Critical => "CRITICAL",
        }
    }

    /// Icon form found in older files
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Error => "❌",
            Self::Warning => "⚠️",
            Self::Info => "ℹ️",
            Self::Debug => "🐛",
            Self::Critical => "🔥",
        }
    }

    /// Parse either the canonical token or its icon.
    ///
    /// Icons are matched with any trailing variation selector stripped, so
    /// both `"⚠"` and `"⚠️"` map to [`Severity::Warning`].
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().trim_end_matches('\u{fe0f}');
        match token.to_ascii_uppercase().as_str() {
            "SUCCESS" => return Some(Self::Success),
            "ERROR" => return Some(Self::Error),
            "WARNING" | "WARN" => return Some(Self::Warning),
            "INFO" => return Some(Self::Info),
            "DEBUG" => return Some(Self::Debug),
            "CRITICAL" => return Some(Self::Critical),
            _ => {}
        }
        match token {
            "✅" => Some(Self::Success),
            "❌" => Some(Self::Error),
            "⚠" => Some(Self::Warning),
            "ℹ" => Some(Self::Info),
            "🐛" => Some(Self::Debug),
            "🔥" | "🚨" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Only ERROR events are promoted into the relational index
    pub fn is_promotable(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known action-kind tokens.
///
/// The vocabulary is open: call sites may use any short code and new ones
/// appear over time. These are the ones the pipeline itself emits.
pub mod actions {
    pub const API_REQUEST: &str = "API_REQUEST";
    pub const API_RESPONSE: &str = "API_RESPONSE";
    pub const DATABASE_QUERY: &str = "DATABASE_QUERY";
    pub const CACHE_OPERATION: &str = "CACHE_OPERATION";
    pub const CACHE_HIT: &str = "CACHE_HIT";
    pub const CACHE_MISS: &str = "CACHE_MISS";
    pub const CREATE: &str = "CREATE";
    pub const READ: &str = "READ";
    pub const UPDATE: &str = "UPDATE";
    pub const DELETE: &str = "DELETE";
    pub const LOGIN: &str = "LOGIN";
    pub const LOGOUT: &str = "LOGOUT";
    pub const ENRICHMENT_FAILED: &str = "ENRICHMENT_FAILED";
}

/// Something worth logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub severity: Severity,
    pub action: String,
    pub message: String,
    pub user_id: Option<String>,
    pub endpoint: Option<String>,
    pub data: Map<String, Value>,
    /// Local wall-clock instant the event was built, millisecond precision
    pub occurred_at: NaiveDateTime,
}

impl Event {
    /// Start building an event stamped with the given clock
    pub fn builder(
        clock: &dyn Clock,
        severity: Severity,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> EventBuilder {
        EventBuilder::new(severity, action, message, clock.now())
    }

    /// Start building an event with an explicit timestamp
    pub fn at(
        occurred_at: NaiveDateTime,
        severity: Severity,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> EventBuilder {
        EventBuilder::new(severity, action, message, occurred_at)
    }
}

/// Builder for [`Event`]
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    fn new(
        severity: Severity,
        action: impl Into<String>,
        message: impl Into<String>,
        occurred_at: NaiveDateTime,
    ) -> Self {
        Self {
            event: Event {
                severity,
                action: action.into(),
                message: message.into(),
                user_id: None,
                endpoint: None,
                data: Map::new(),
                occurred_at: truncate_to_millis(occurred_at),
            },
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.event.user_id = Some(user_id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.event.endpoint = Some(endpoint.into());
        self
    }

    /// Add a single payload entry
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event.data.insert(key.into(), value.into());
        self
    }

    /// Replace the whole payload
    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.event.data = data;
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use serde_json::json;

    fn clock() -> FixedClock {
        FixedClock::new(
            NaiveDateTime::parse_from_str("2025-03-04 08:15:30.250", "%Y-%m-%d %H:%M:%S%.f")
                .unwrap(),
        )
    }

    #[test]
    fn test_severity_parse_tokens_and_icons() {
        assert_eq!(Severity::parse("ERROR"), Some(Severity::Error));
        assert_eq!(Severity::parse("error"), Some(Severity::Error));
        assert_eq!(Severity::parse("❌"), Some(Severity::Error));
        assert_eq!(Severity::parse("⚠️"), Some(Severity::Warning));
        assert_eq!(Severity::parse("⚠"), Some(Severity::Warning));
        assert_eq!(Severity::parse("✅"), Some(Severity::Success));
        assert_eq!(Severity::parse("🔥"), Some(Severity::Critical));
        assert_eq!(Severity::parse("NOPE"), None);
    }

    #[test]
    fn test_only_error_is_promotable() {
        assert!(Severity::Error.is_promotable());
        assert!(!Severity::Critical.is_promotable());
        assert!(!Severity::Warning.is_promotable());
        assert!(!Severity::Info.is_promotable());
    }

    #[test]
    fn test_builder() {
        let event = Event::builder(&clock(), Severity::Error, actions::CREATE, "CREATE failed")
            .user_id("42")
            .endpoint("/api/students/")
            .field("table_name", "students")
            .field("duration_ms", json!(12))
            .build();

        assert_eq!(event.severity, Severity::Error);
        assert_eq!(event.action, "CREATE");
        assert_eq!(event.user_id.as_deref(), Some("42"));
        assert_eq!(event.endpoint.as_deref(), Some("/api/students/"));
        assert_eq!(event.data.get("table_name"), Some(&json!("students")));
        assert_eq!(event.occurred_at, clock().now());
    }
}
