// Request recording middleware
// Decision: One API_REQUEST event per request, severity from the response status
// Decision: 5xx responses take the direct path so the row exists before the response leaves

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use campuslog_core::{actions, Severity};
use campuslog_durable::EventLogService;

/// Paths that are not worth a line per call
const UNRECORDED_PATHS: &[&str] = &["/health"];

/// Severity recorded for a response status
pub fn severity_for(status: StatusCode) -> Severity {
    if status.is_server_error() {
        Severity::Error
    } else if status.is_client_error() {
        Severity::Warning
    } else {
        Severity::Info
    }
}

pub async fn record_requests(
    State(service): State<Arc<EventLogService>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if UNRECORDED_PATHS.contains(&path.as_str()) {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let user_agent = req
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let severity = severity_for(status);
    let mut builder = service
        .event(
            severity,
            actions::API_REQUEST,
            format!("API Request {} {} -> {}", method, path, status.as_u16()),
        )
        .endpoint(path)
        .field("method", method.as_str())
        .field("status_code", status.as_u16())
        .field("duration_ms", started.elapsed().as_millis() as u64);
    if let Some(user_agent) = user_agent {
        builder = builder.field("user_agent", user_agent);
    }
    let event = builder.build();

    if severity == Severity::Error {
        if let Err(e) = service.record_error_direct(&event).await {
            tracing::warn!("Failed to index failed request: {}", e);
        }
    } else {
        service.record(&event).await;
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_for_status() {
        assert_eq!(severity_for(StatusCode::OK), Severity::Info);
        assert_eq!(severity_for(StatusCode::CREATED), Severity::Info);
        assert_eq!(severity_for(StatusCode::NOT_FOUND), Severity::Warning);
        assert_eq!(severity_for(StatusCode::BAD_REQUEST), Severity::Warning);
        assert_eq!(severity_for(StatusCode::INTERNAL_SERVER_ERROR), Severity::Error);
        assert_eq!(severity_for(StatusCode::SERVICE_UNAVAILABLE), Severity::Error);
    }
}
