//! Heuristic action/status classification
//!
//! Maps the open action-kind vocabulary (tokens and icons) and free-text
//! messages onto the canonical taxonomy stored in `log_records.action` and
//! `log_records.status`. Live enrichment and batch import both call
//! [`classify_with_level`], so a given line always lands on the same
//! canonical action and status regardless of which path promoted it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::Severity;

/// Row status in the relational index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    Success,
    Warning,
    Error,
    Info,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Info => "INFO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Some(Self::Success),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "INFO" => Some(Self::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub action: String,
    pub status: LogStatus,
}

/// Known action tokens (and their icons) → canonical action
const TOKEN_TABLE: &[(&str, &str)] = &[
    ("API_REQUEST", "API_REQUEST"),
    ("API_RESPONSE", "API_REQUEST"),
    ("🌐", "API_REQUEST"),
    ("📡", "API_REQUEST"),
    ("DATABASE_QUERY", "DATABASE_QUERY"),
    ("DATABASE", "DATABASE_QUERY"),
    ("🗄", "DATABASE_QUERY"),
    ("CACHE_OPERATION", "CACHE_OPERATION"),
    ("CACHE_HIT", "CACHE_OPERATION"),
    ("CACHE_MISS", "CACHE_OPERATION"),
    ("CACHE_SET", "CACHE_OPERATION"),
    ("CACHE_DELETE", "CACHE_OPERATION"),
    ("💾", "CACHE_OPERATION"),
    ("⚡", "CACHE_OPERATION"),
    ("CREATE", "CREATE"),
    ("➕", "CREATE"),
    ("READ", "READ"),
    ("VIEW", "READ"),
    ("👁", "READ"),
    ("UPDATE", "UPDATE"),
    ("✏", "UPDATE"),
    ("DELETE", "DELETE"),
    ("🗑", "DELETE"),
    ("LOGIN", "LOGIN"),
    ("🔑", "LOGIN"),
    ("🔐", "LOGIN"),
    ("LOGOUT", "LOGOUT"),
    ("🚪", "LOGOUT"),
];

/// Message substrings → canonical action, in priority order
const MESSAGE_PATTERNS: &[(&str, &str)] = &[
    ("API Request", "API_REQUEST"),
    ("API Response", "API_REQUEST"),
    ("Database", "DATABASE_QUERY"),
    ("Cache", "CACHE_OPERATION"),
    ("CREATE", "CREATE"),
    ("UPDATE", "UPDATE"),
    ("DELETE", "DELETE"),
    ("LOGIN", "LOGIN"),
    ("LOGOUT", "LOGOUT"),
    ("READ", "READ"),
];

const ERROR_MARKERS: &[&str] = &["ERROR", "FAILED", "❌"];
const WARNING_MARKERS: &[&str] = &["WARNING", "⚠"];
const SUCCESS_MARKERS: &[&str] = &["SUCCESS", "✅"];

/// Classify an action token and message.
///
/// Known tokens win; otherwise message substrings are tried in priority
/// order; otherwise the token is returned verbatim with status INFO.
pub fn classify(action_token: &str, message: &str) -> Classification {
    let token = action_token.trim().trim_end_matches('\u{fe0f}');

    if let Some(action) = lookup_token(token) {
        return Classification {
            action: action.to_string(),
            status: message_status(message).unwrap_or(LogStatus::Info),
        };
    }

    if let Some((_, action)) = MESSAGE_PATTERNS
        .iter()
        .find(|(needle, _)| message.contains(needle))
    {
        return Classification {
            action: action.to_string(),
            status: message_status(message).unwrap_or(LogStatus::Info),
        };
    }

    debug!(action_token, "unrecognized action token, keeping verbatim");
    Classification {
        action: action_token.to_string(),
        status: LogStatus::Info,
    }
}

/// Classify with the event's own severity folded into the status.
///
/// ERROR/CRITICAL severities force ERROR, WARNING forces at least WARNING,
/// SUCCESS yields SUCCESS when the message itself is neutral.
pub fn classify_with_level(
    severity: Option<Severity>,
    action_token: &str,
    message: &str,
) -> Classification {
    let mut classification = classify(action_token, message);
    let from_message = message_status(message);

    classification.status = match (severity, from_message) {
        (Some(Severity::Error | Severity::Critical), _) => LogStatus::Error,
        (_, Some(LogStatus::Error)) => LogStatus::Error,
        (Some(Severity::Warning), _) => LogStatus::Warning,
        (_, Some(status)) => status,
        (Some(Severity::Success), None) => LogStatus::Success,
        _ => LogStatus::Info,
    };
    classification
}

fn lookup_token(token: &str) -> Option<&'static str> {
    if token.is_empty() {
        return None;
    }
    let upper = token.to_ascii_uppercase();
    TOKEN_TABLE
        .iter()
        .find(|(known, _)| *known == upper)
        .map(|(_, canonical)| *canonical)
}

fn message_status(message: &str) -> Option<LogStatus> {
    if ERROR_MARKERS.iter().any(|m| message.contains(m)) {
        Some(LogStatus::Error)
    } else if WARNING_MARKERS.iter().any(|m| message.contains(m)) {
        Some(LogStatus::Warning)
    } else if SUCCESS_MARKERS.iter().any(|m| message.contains(m)) {
        Some(LogStatus::Success)
    } else {
        None
    }
}
