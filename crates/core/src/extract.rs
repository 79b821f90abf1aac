//! Best-effort field extraction from event payloads and messages
//!
//! Nothing here fails: a field that cannot be derived is simply `None`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Payload keys copied into the serialized extra-context column
const CONTEXT_KEYS: &[&str] = &[
    "url",
    "method",
    "path",
    "status_code",
    "duration_ms",
    "response_time",
    "response_size",
    "query",
    "cache_key",
    "new_values",
];

/// Canonical actions for which a table name may be read out of the message
const TABLE_BEARING_ACTIONS: &[&str] = &["DATABASE_QUERY", "CREATE", "READ", "UPDATE", "DELETE"];

/// Fields derived from one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub user_type: Option<String>,
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub error_message: Option<String>,
}

/// Inputs to [`extract_fields`]
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub canonical_action: &'a str,
    pub is_error: bool,
    pub message: &'a str,
    pub user_id: Option<&'a str>,
    pub endpoint: Option<&'a str>,
    pub data: &'a Map<String, Value>,
}

pub fn extract_fields(input: ExtractionInput<'_>) -> ExtractedFields {
    let data = input.data;
    let endpoint_parts = input.endpoint.and_then(parse_endpoint);

    let user_type = string_field(data, &["user_type", "role"])
        .or_else(|| input.user_id.map(|_| "user".to_string()));

    let table_name = string_field(data, &["table_name", "table", "model"])
        .or_else(|| endpoint_parts.as_ref().map(|(resource, _)| resource.clone()))
        .or_else(|| {
            if TABLE_BEARING_ACTIONS.contains(&input.canonical_action) {
                table_from_message(input.message)
            } else {
                None
            }
        });

    let record_id = scalar_field(data, &["record_id", "id", "pk"])
        .or_else(|| endpoint_parts.and_then(|(_, id)| id))
        .or_else(|| record_id_from_message(input.message));

    let ip_address = string_field(data, &["ip_address", "ip", "client_ip", "remote_addr"]);
    let user_agent = string_field(data, &["user_agent"]);

    let old_values = data.get("old_values").filter(|v| !v.is_null()).map(render);

    let mut context = Map::new();
    for key in CONTEXT_KEYS {
        if let Some(value) = data.get(*key).filter(|v| !v.is_null()) {
            context.insert((*key).to_string(), value.clone());
        }
    }
    if let Some(endpoint) = input.endpoint {
        context.insert("endpoint".to_string(), Value::String(endpoint.to_string()));
    }
    let new_values = if context.is_empty() {
        None
    } else {
        Some(Value::Object(context).to_string())
    };

    let error_message = string_field(data, &["error", "exception", "detail"]).or_else(|| {
        if input.is_error {
            Some(input.message.to_string())
        } else {
            None
        }
    });

    ExtractedFields {
        user_type,
        table_name,
        record_id,
        ip_address,
        user_agent,
        old_values,
        new_values,
        error_message,
    }
}

fn string_field(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn scalar_field(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn endpoint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^/api/(?:v\d+/)?([A-Za-z_][A-Za-z0-9_-]*)(?:/(\d+|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}))?(?:/|$|\?)",
        )
        .expect("endpoint pattern is valid")
    })
}

fn table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:on|in|from|into|table)\s+([a-z_][a-z0-9_]*)")
            .expect("table pattern is valid")
    })
}

fn record_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\b(?:id|ID|Id)\s*[:=]\s*|#)(\d+)\b").expect("record id pattern is valid")
    })
}

/// `/api/v1/students/42/` → ("students", Some("42"))
fn parse_endpoint(endpoint: &str) -> Option<(String, Option<String>)> {
    let path = endpoint.split_whitespace().last()?;
    let caps = endpoint_regex().captures(path)?;
    let resource = caps.get(1)?.as_str().replace('-', "_");
    let id = caps.get(2).map(|m| m.as_str().to_string());
    Some((resource, id))
}

fn table_from_message(message: &str) -> Option<String> {
    table_regex()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn record_id_from_message(message: &str) -> Option<String> {
    record_id_regex()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
