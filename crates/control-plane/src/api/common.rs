// Common DTOs for the admin API
//
// These types are shared across the log endpoints.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::Json;
use campuslog_durable::{DirectoryError, ImportError, RetentionError, StoreError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Response wrapper for list endpoints.
/// All list endpoints return responses wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// Items returned by the list operation.
    pub data: Vec<T>,
    /// Total matching items, when the endpoint paginates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data, total: None }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self::new(data)
    }
}

/// Number of rows touched by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

/// Parse a JSON body that may be left out entirely.
///
/// An empty body yields the default request; a body that is present but
/// does not deserialize is a 400.
pub fn optional_json<T: DeserializeOwned + Default>(
    body: &Bytes,
) -> Result<T, (StatusCode, Json<ErrorResponse>)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        ErrorResponse::new(format!("invalid request body: {e}")).into_response(StatusCode::BAD_REQUEST)
    })
}

pub fn store_error(context: &str, e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        StoreError::NotFound(id) => {
            ErrorResponse::new(format!("log record not found: {id}")).into_response(StatusCode::NOT_FOUND)
        }
        other => {
            tracing::error!("{}: {}", context, other);
            ErrorResponse::new(other.to_string()).into_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn directory_error(context: &str, e: DirectoryError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        DirectoryError::NotPartition(_) => StatusCode::BAD_REQUEST,
        DirectoryError::FileNotFound(_) => StatusCode::NOT_FOUND,
        DirectoryError::Missing(_) | DirectoryError::Io { .. } => {
            tracing::error!("{}: {}", context, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    ErrorResponse::new(e.to_string()).into_response(status)
}

pub fn import_error(context: &str, e: ImportError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        ImportError::Directory(e) => directory_error(context, e),
    }
}

pub fn retention_error(context: &str, e: RetentionError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        RetentionError::Directory(e) => directory_error(context, e),
    }
}
