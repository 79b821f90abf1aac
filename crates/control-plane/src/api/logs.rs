// Log admin API routes
// Decision: Every operator action of the admin facade is one endpoint
// Decision: Recovery always answers with its per-step report; 500 when a step failed

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use campuslog_core::{LogRecord, LogStatus};
use campuslog_durable::{
    CleanupReport, EventLogService, FileInfo, ImportOptions, ImportSummary, ImportTarget,
    LogFilter, Pagination, PipelineStats, RecoveryReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::common::{
    directory_error, import_error, optional_json, retention_error, store_error, AffectedResponse,
    ApiResult, ErrorResponse, ListResponse,
};

/// Largest page a caller may request
const MAX_PAGE_SIZE: u32 = 1000;

/// App state for log routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EventLogService>,
}

impl AppState {
    pub fn new(service: Arc<EventLogService>) -> Self {
        Self { service }
    }
}

/// Query parameters for listing rows
#[derive(Debug, Default, Deserialize)]
pub struct ListLogsQuery {
    /// SUCCESS, WARNING, ERROR or INFO
    pub status: Option<String>,
    pub is_fixed: Option<bool>,
    pub is_read: Option<bool>,
    pub action: Option<String>,
    pub table_name: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ListLogsQuery {
    fn filter(&self) -> Result<LogFilter, String> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(LogStatus::parse(raw).ok_or_else(|| format!("unknown status: {raw}"))?),
        };
        Ok(LogFilter {
            status,
            is_fixed: self.is_fixed,
            is_read: self.is_read,
            action: self.action.clone(),
            table_name: self.table_name.clone(),
        })
    }

    fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            offset: self.offset.unwrap_or(defaults.offset),
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

/// Body of `POST /v1/logs/import`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImportRequest {
    /// Single partition file, e.g. `app_2025-01-01.log`
    #[serde(default)]
    pub file: Option<String>,
    /// Only today's file
    #[serde(default)]
    pub today: bool,
    #[serde(default)]
    pub limit_per_file: Option<usize>,
    /// Import every level instead of ERROR only
    #[serde(default)]
    pub all_levels: bool,
}

impl ImportRequest {
    fn target(&self) -> ImportTarget {
        match (&self.file, self.today) {
            (Some(file), _) => ImportTarget::File(file.clone()),
            (None, true) => ImportTarget::Today,
            (None, false) => ImportTarget::All,
        }
    }

    fn options(&self) -> ImportOptions {
        let options = if self.all_levels {
            ImportOptions::everything()
        } else {
            ImportOptions::errors()
        };
        options.with_per_file_limit(self.limit_per_file)
    }
}

/// Body of `POST /v1/logs/cleanup`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub keep_today_only: bool,
}

/// Body of the id-list mutations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdsRequest {
    pub ids: Vec<Uuid>,
}

impl IdsRequest {
    fn validated(&self) -> Result<&[Uuid], (StatusCode, Json<ErrorResponse>)> {
        if self.ids.is_empty() {
            return Err(ErrorResponse::new("ids must not be empty").into_response(StatusCode::BAD_REQUEST));
        }
        Ok(&self.ids)
    }
}

/// Create log routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/logs", get(list_logs).delete(delete_all_logs))
        .route("/v1/logs/files", get(list_files))
        .route("/v1/logs/stats", get(stats))
        .route("/v1/logs/import", post(import_logs))
        .route("/v1/logs/cleanup", post(cleanup))
        .route(
            "/v1/logs/cleanup-and-import-errors",
            post(cleanup_and_import_errors),
        )
        .route("/v1/logs/read", delete(delete_read_errors))
        .route("/v1/logs/mark-fixed", post(mark_fixed))
        .route("/v1/logs/mark-read", post(mark_read))
        .route("/v1/logs/delete", post(delete_rows))
        .route("/v1/logs/:log_id", get(get_log))
        .with_state(state)
}

/// GET /v1/logs - List rows of the error index, newest first
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<ListLogsQuery>,
) -> ApiResult<ListResponse<LogRecord>> {
    let filter = query
        .filter()
        .map_err(|e| ErrorResponse::new(e).into_response(StatusCode::BAD_REQUEST))?;
    let admin = state.service.admin();

    let rows = admin
        .list_rows(&filter, query.pagination())
        .await
        .map_err(|e| store_error("Failed to list log records", e))?;
    let total = admin
        .count_rows(&filter)
        .await
        .map_err(|e| store_error("Failed to count log records", e))?;

    Ok(Json(ListResponse::new(rows).with_total(total)))
}

/// GET /v1/logs/:log_id - One row
pub async fn get_log(
    State(state): State<AppState>,
    Path(log_id): Path<Uuid>,
) -> ApiResult<LogRecord> {
    let row = state
        .service
        .admin()
        .get_row(log_id)
        .await
        .map_err(|e| store_error("Failed to get log record", e))?;
    Ok(Json(row))
}

/// GET /v1/logs/files - Partition files with size, line count and mtime
pub async fn list_files(State(state): State<AppState>) -> ApiResult<ListResponse<FileInfo>> {
    let files = state
        .service
        .admin()
        .list_files_info()
        .await
        .map_err(|e| directory_error("Failed to list log files", e))?;
    Ok(Json(ListResponse::new(files)))
}

/// GET /v1/logs/stats - Writer and dispatcher counters
pub async fn stats(State(state): State<AppState>) -> Json<PipelineStats> {
    Json(state.service.stats())
}

/// POST /v1/logs/import - Reconcile files into the error index
///
/// An empty body imports ERROR lines from every file.
pub async fn import_logs(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ImportSummary> {
    let request: ImportRequest = optional_json(&body)?;
    let summary = state
        .service
        .admin()
        .import_with(&request.target(), &request.options())
        .await
        .map_err(|e| import_error("Failed to import log files", e))?;

    tracing::info!(
        files = summary.files_processed,
        imported = summary.records_imported,
        duplicates = summary.duplicates,
        "import finished"
    );
    Ok(Json(summary))
}

/// POST /v1/logs/cleanup - Delete partition files by the retention policy
pub async fn cleanup(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<CleanupReport> {
    let request: CleanupRequest = optional_json(&body)?;
    let report = state
        .service
        .admin()
        .cleanup(request.keep_today_only)
        .await
        .map_err(|e| retention_error("Failed to clean up log files", e))?;
    Ok(Json(report))
}

/// POST /v1/logs/cleanup-and-import-errors - Wipe rows, keep today, re-import
pub async fn cleanup_and_import_errors(
    State(state): State<AppState>,
) -> (StatusCode, Json<RecoveryReport>) {
    let report = state.service.admin().cleanup_and_import_errors().await;
    let status = if report.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

/// DELETE /v1/logs - Delete every row
pub async fn delete_all_logs(State(state): State<AppState>) -> ApiResult<AffectedResponse> {
    let affected = state
        .service
        .admin()
        .delete_all_logs()
        .await
        .map_err(|e| store_error("Failed to delete log records", e))?;
    tracing::warn!(affected, "deleted all log records");
    Ok(Json(AffectedResponse { affected }))
}

/// DELETE /v1/logs/read - Delete ERROR rows already marked read
pub async fn delete_read_errors(State(state): State<AppState>) -> ApiResult<AffectedResponse> {
    let affected = state
        .service
        .admin()
        .delete_read_errors()
        .await
        .map_err(|e| store_error("Failed to delete read log records", e))?;
    Ok(Json(AffectedResponse { affected }))
}

/// POST /v1/logs/mark-fixed
pub async fn mark_fixed(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<AffectedResponse> {
    let ids = request.validated()?;
    let affected = state
        .service
        .admin()
        .mark_rows_fixed(ids)
        .await
        .map_err(|e| store_error("Failed to mark log records fixed", e))?;
    Ok(Json(AffectedResponse { affected }))
}

/// POST /v1/logs/mark-read
pub async fn mark_read(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<AffectedResponse> {
    let ids = request.validated()?;
    let affected = state
        .service
        .admin()
        .mark_rows_read(ids)
        .await
        .map_err(|e| store_error("Failed to mark log records read", e))?;
    Ok(Json(AffectedResponse { affected }))
}

/// POST /v1/logs/delete
pub async fn delete_rows(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<AffectedResponse> {
    let ids = request.validated()?;
    let affected = state
        .service
        .admin()
        .delete_rows(ids)
        .await
        .map_err(|e| store_error("Failed to delete log records", e))?;
    Ok(Json(AffectedResponse { affected }))
}
