// Admin API tests against an in-memory store
// Run with: cargo test -p campuslog-control-plane --test api_test

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use campuslog_control_plane::{build_router, RouterConfig};
use campuslog_core::{actions, EncodedRecord, FixedClock, LogStatus, Severity};
use campuslog_durable::{EventLogService, InMemoryLogRecordStore, PipelineConfig};
use chrono::NaiveDateTime;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    dir: TempDir,
    store: Arc<InMemoryLogRecordStore>,
    service: Arc<EventLogService>,
    app: Router,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let now = NaiveDateTime::parse_from_str("2025-01-02 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    let store = Arc::new(InMemoryLogRecordStore::new());
    let service = Arc::new(
        EventLogService::start_with_clock(
            PipelineConfig::default().with_log_dir(dir.path()),
            store.clone(),
            Arc::new(FixedClock::new(now)),
        )
        .await
        .unwrap(),
    );
    let app = build_router(Arc::clone(&service), &RouterConfig::default());
    TestApp {
        dir,
        store,
        service,
        app,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn today_lines(t: &TestApp) -> Vec<EncodedRecord> {
    std::fs::read_to_string(t.dir.path().join("app_2025-01-02.log"))
        .unwrap_or_default()
        .lines()
        .map(|l| EncodedRecord::decode(l).unwrap())
        .collect()
}

fn error_line(ts: &str, message: &str) -> String {
    format!(r#"{{"timestamp":"{ts}","level":"ERROR","action":"UPDATE","message":"{message}"}}"#)
}

#[tokio::test]
async fn test_health_is_not_recorded() {
    let t = test_app().await;

    let (status, body) = send(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["dispatcher"], "running");

    t.service.flush().await;
    assert!(today_lines(&t).is_empty());
    t.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_import_then_list_and_mark() {
    let t = test_app().await;
    std::fs::write(
        t.dir.path().join("app_2025-01-01.log"),
        [
            error_line("2025-01-01 09:00:00.000", "UPDATE FAILED on grades"),
            error_line("2025-01-01 09:00:05.000", "UPDATE FAILED on fees"),
        ]
        .join("\n"),
    )
    .unwrap();

    let (status, summary) = send(&t.app, "POST", "/v1/logs/import", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["records_imported"], 2);

    // Importing again changes nothing
    let (_, summary) = send(&t.app, "POST", "/v1/logs/import", None).await;
    assert_eq!(summary["records_imported"], 0);
    assert_eq!(summary["duplicates"], 2);

    let (status, list) = send(&t.app, "GET", "/v1/logs?status=ERROR&limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 2);
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
    assert_eq!(list["data"][0]["message"], "UPDATE FAILED on fees");

    let id = list["data"][0]["log_id"].as_str().unwrap().to_string();
    let (status, marked) =
        send(&t.app, "POST", "/v1/logs/mark-read", Some(json!({ "ids": [id] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["affected"], 1);

    let (_, deleted) = send(&t.app, "DELETE", "/v1/logs/read", None).await;
    assert_eq!(deleted["affected"], 1);

    let (status, _) = send(&t.app, "GET", &format!("/v1/logs/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    t.service.shutdown().await.unwrap();
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn test_malformed_import_body_is_rejected() {
    let t = test_app().await;
    std::fs::write(
        t.dir.path().join("app_2025-01-01.log"),
        error_line("2025-01-01 09:00:00.000", "UPDATE FAILED on grades"),
    )
    .unwrap();

    let (status, body) = send(&t.app, "POST", "/v1/logs/import", Some(json!({ "file": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));

    let (status, _) = send(&t.app, "POST", "/v1/logs/cleanup", Some(json!({ "keep_today_only": "yes" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(t.dir.path().join("app_2025-01-01.log").exists());

    t.service.shutdown().await.unwrap();
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_files_and_stats() {
    let t = test_app().await;
    let event = t
        .service
        .event(Severity::Info, actions::READ, "READ students")
        .build();
    t.service.record(&event).await;
    t.service.flush().await;

    let (status, files) = send(&t.app, "GET", "/v1/logs/files", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(files["data"][0]["name"], "app_2025-01-02.log");
    assert_eq!(files["data"][0]["line_count"], 1);

    let (status, stats) = send(&t.app, "GET", "/v1/logs/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["dispatcher_status"], "running");
    assert!(stats["writer"]["lines_written"].as_u64().unwrap() >= 1);

    t.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_errors_are_recorded_as_warnings() {
    let t = test_app().await;

    let (status, body) = send(&t.app, "POST", "/v1/logs/mark-fixed", Some(json!({ "ids": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ids must not be empty");

    let (status, _) = send(&t.app, "GET", "/v1/logs?status=BROKEN", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    t.service.flush().await;
    let lines = today_lines(&t);
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.action == actions::API_REQUEST));
    assert!(lines.iter().all(|l| l.severity() == Some(Severity::Warning)));
    assert_eq!(lines[0].endpoint.as_deref(), Some("/v1/logs/mark-fixed"));
    assert_eq!(lines[0].data["status_code"], 400);

    t.service.shutdown().await.unwrap();
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_server_errors_are_indexed_directly() {
    let t = test_app().await;
    t.service.flush().await;
    std::fs::remove_dir_all(t.dir.path()).unwrap();

    let (status, body) = send(&t.app, "GET", "/v1/logs/files", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("does not exist"));

    // The row exists as soon as the response is out
    let rows = t.store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, LogStatus::Error);
    assert!(rows[0].is_read);

    t.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_recovery_endpoint() {
    let t = test_app().await;
    std::fs::write(
        t.dir.path().join("app_2024-12-01.log"),
        error_line("2024-12-01 09:00:00.000", "old FAILED"),
    )
    .unwrap();
    std::fs::write(
        t.dir.path().join("app_2025-01-02.log"),
        [
            error_line("2025-01-02 09:00:00.000", "a FAILED"),
            error_line("2025-01-02 09:00:01.000", "b FAILED"),
            error_line("2025-01-02 09:00:02.000", "c FAILED"),
        ]
        .join("\n")
            + "\n",
    )
    .unwrap();

    let (status, report) =
        send(&t.app, "POST", "/v1/logs/cleanup-and-import-errors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["cleanup"]["deleted"], json!(["app_2024-12-01.log"]));
    assert_eq!(report["import"]["records_imported"], 3);
    let steps: Vec<&str> = report["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["completed", "completed", "completed"]);

    let (_, deleted) = send(&t.app, "DELETE", "/v1/logs", None).await;
    assert_eq!(deleted["affected"], 3);

    t.service.shutdown().await.unwrap();
}
