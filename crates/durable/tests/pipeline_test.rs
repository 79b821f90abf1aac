//! End-to-end tests for the assembled pipeline
//!
//! Run with: cargo test -p campuslog-durable --test pipeline_test

use std::sync::Arc;

use campuslog_core::{actions, EncodedRecord, Event, FixedClock, LogStatus, Severity};
use campuslog_durable::prelude::*;
use chrono::NaiveDateTime;
use tempfile::TempDir;

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.3f").unwrap()
}

struct Pipeline {
    dir: TempDir,
    clock: Arc<FixedClock>,
    store: Arc<InMemoryLogRecordStore>,
    service: EventLogService,
}

async fn pipeline(now: &str) -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(at(now)));
    let store = Arc::new(InMemoryLogRecordStore::new());
    let config = PipelineConfig::default().with_log_dir(dir.path());
    let service = EventLogService::start_with_clock(config, store.clone(), clock.clone())
        .await
        .unwrap();
    Pipeline {
        dir,
        clock,
        store,
        service,
    }
}

/// Wait for background enrichment to insert `rows` rows
async fn wait_for_inserted(p: &Pipeline, rows: u64) {
    for _ in 0..200 {
        if p.service.stats().dispatcher.inserted >= rows {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("enrichment did not insert {rows} row(s)");
}

fn file_lines(p: &Pipeline, name: &str) -> Vec<EncodedRecord> {
    std::fs::read_to_string(p.dir.path().join(name))
        .unwrap_or_default()
        .lines()
        .map(|l| EncodedRecord::decode(l).unwrap())
        .collect()
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_every_event_is_one_line_under_concurrency() {
    let p = Arc::new(pipeline("2025-01-01 10:00:00.000").await);

    let mut handles = Vec::new();
    for task in 0..8 {
        let p = Arc::clone(&p);
        handles.push(tokio::spawn(async move {
            for n in 0..50 {
                let event = p
                    .service
                    .event(Severity::Info, actions::READ, format!("task {task} event {n}"))
                    .build();
                p.service.record(&event).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    p.service.shutdown().await.unwrap();

    let lines = file_lines(&p, "app_2025-01-01.log");
    assert_eq!(lines.len(), 400);

    let mut messages: Vec<String> = lines.into_iter().map(|l| l.message).collect();
    messages.sort();
    messages.dedup();
    assert_eq!(messages.len(), 400);

    // Per-producer order is preserved
    for task in 0..8 {
        let prefix = format!("task {task} ");
        let own: Vec<String> = file_lines(&p, "app_2025-01-01.log")
            .into_iter()
            .map(|l| l.message)
            .filter(|m| m.starts_with(&prefix))
            .collect();
        let expected: Vec<String> = (0..50).map(|n| format!("task {task} event {n}")).collect();
        assert_eq!(own, expected);
    }
}

#[test_log::test(tokio::test)]
async fn test_only_errors_reach_the_index() {
    let p = pipeline("2025-01-01 10:00:00.000").await;

    for n in 0..3 {
        p.clock.set(at(&format!("2025-01-01 10:00:0{n}.000")));
        let event = p
            .service
            .event(Severity::Error, actions::CREATE, format!("CREATE FAILED #{n}"))
            .build();
        p.service.record(&event).await;
    }
    for severity in [Severity::Info, Severity::Success, Severity::Warning, Severity::Debug] {
        let event = p.service.event(severity, actions::READ, "READ students").build();
        p.service.record(&event).await;
    }
    p.service.shutdown().await.unwrap();

    let rows = p.store.all();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.status == LogStatus::Error));
    assert_eq!(file_lines(&p, "app_2025-01-01.log").len(), 7);
}

#[test_log::test(tokio::test)]
async fn test_live_rows_and_import_dedup_against_each_other() {
    let p = pipeline("2025-01-01 10:00:00.250").await;

    let event = p
        .service
        .event(Severity::Error, actions::UPDATE, "UPDATE FAILED on grades")
        .endpoint("/api/v1/grades/12/")
        .build();
    p.service.record(&event).await;
    wait_for_inserted(&p, 1).await;

    // Time passes before the importer runs; the row keeps the event time
    p.clock.set(at("2025-01-01 18:00:00.000"));
    p.service.flush().await;
    let summary = p.service.admin().import(None).await.unwrap();
    p.service.shutdown().await.unwrap();

    let rows = p.store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].created_at, at("2025-01-01 10:00:00.250"));
    assert_eq!(rows[0].table_name.as_deref(), Some("grades"));
    assert_eq!(rows[0].record_id.as_deref(), Some("12"));
    assert_eq!(summary.records_imported, 0);
    assert_eq!(summary.duplicates, 1);
}

#[test_log::test(tokio::test)]
async fn test_scenario_icon_line() {
    let p = pipeline("2025-01-02 08:00:00.000").await;
    std::fs::write(
        p.dir.path().join("app_2025-01-01.log"),
        "{\"level\":\"❌\",\"message\":\"Database ERROR on students\",\"action\":\"🗄️\",\"timestamp\":\"2025-01-01 10:00:00.000\"}\n",
    )
    .unwrap();

    let summary = p
        .service
        .admin()
        .import_with(
            &ImportTarget::File("app_2025-01-01.log".into()),
            &ImportOptions::errors(),
        )
        .await
        .unwrap();
    p.service.shutdown().await.unwrap();

    assert_eq!(summary.records_imported, 1);
    let rows = p.store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, LogStatus::Error);
    assert_eq!(rows[0].action, "DATABASE_QUERY");
    assert_eq!(rows[0].table_name.as_deref(), Some("students"));
    assert_eq!(rows[0].created_at, at("2025-01-01 10:00:00.000"));
}

#[test_log::test(tokio::test)]
async fn test_purge_then_recover_today() {
    let p = pipeline("2025-01-05 09:00:00.000").await;

    for n in 0..3 {
        let event = Event::at(
            at(&format!("2025-01-05 08:00:0{n}.000")),
            Severity::Error,
            actions::DELETE,
            format!("DELETE FAILED on fees id={n}"),
        )
        .build();
        p.service.record(&event).await;
    }
    p.service.flush().await;
    wait_for_inserted(&p, 3).await;
    std::fs::write(p.dir.path().join("app_2025-01-04.log"), "").unwrap();

    let deleted = p.service.admin().delete_all_logs().await.unwrap();
    assert_eq!(deleted, 3);

    let report = p.service.admin().cleanup_and_import_errors().await;
    p.service.shutdown().await.unwrap();

    assert!(report.succeeded(), "{report:?}");
    assert_eq!(report.import.as_ref().unwrap().records_imported, 3);
    assert_eq!(p.store.len(), 3);
    assert!(!p.dir.path().join("app_2025-01-04.log").exists());
    assert!(p.dir.path().join("app_2025-01-05.log").exists());
}

#[test_log::test(tokio::test)]
async fn test_direct_path_marks_read_and_dedups() {
    let p = pipeline("2025-01-01 10:00:00.000").await;

    let event = p
        .service
        .event(Severity::Error, actions::API_REQUEST, "GET /api/students/ -> 500")
        .field("status_code", 500)
        .build();
    let first = p.service.record_error_direct(&event).await.unwrap();
    let second = p.service.record_error_direct(&event).await.unwrap();
    p.service.shutdown().await.unwrap();

    assert!(matches!(first, Promotion::Inserted(ref r) if r.is_read));
    assert_eq!(second, Promotion::Duplicate(first.log_id()));
    assert_eq!(file_lines(&p, "app_2025-01-01.log").len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_stats_after_shutdown() {
    let p = pipeline("2025-01-01 10:00:00.000").await;
    let event = p
        .service
        .event(Severity::Error, actions::LOGIN, "LOGIN FAILED for admin")
        .build();
    p.service.record(&event).await;
    p.service.shutdown().await.unwrap();

    let stats = p.service.stats();
    assert_eq!(stats.writer.lines_written, 1);
    assert_eq!(stats.dispatcher.enqueued, 1);
    assert_eq!(stats.dispatcher.inserted, 1);
    assert_eq!(stats.dispatcher.in_flight, 0);
}
