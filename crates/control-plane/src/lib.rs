// Campuslog Control Plane Library
// Decision: Router assembly lives here so the binary and the tests build the same app

// API routes and types
pub mod api;

// Request recording
pub mod middleware;

// Store selection (PostgreSQL or in-memory)
pub mod storage;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, middleware::from_fn_with_state, routing::get, Json, Router};
use campuslog_durable::{DispatcherStatus, EventLogService};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    dispatcher: DispatcherStatus,
}

async fn health(State(service): State<Arc<EventLogService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        dispatcher: service.stats().dispatcher_status,
    })
}

/// Router options read by the binary
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Prefix for API routes, e.g. `/api` gives `/api/v1/logs`
    pub api_prefix: String,
    /// Origins allowed by CORS; empty means same-origin only
    pub cors_origins: Vec<HeaderValue>,
}

impl RouterConfig {
    /// Environment variables:
    /// - `API_PREFIX`: prefix for API routes (default: empty)
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated origins (default: none)
    pub fn from_env() -> Self {
        let api_prefix = std::env::var("API_PREFIX").unwrap_or_default();
        let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
            .unwrap_or_default();
        Self {
            api_prefix,
            cors_origins,
        }
    }
}

/// Build the admin app: health, log routes, request recording, tracing
pub fn build_router(service: Arc<EventLogService>, config: &RouterConfig) -> Router {
    let api_routes = api::logs::routes(api::logs::AppState::new(Arc::clone(&service)));

    let app = Router::new()
        .route("/health", get(health).with_state(Arc::clone(&service)))
        .merge(build_router_with_prefix(api_routes, &config.api_prefix))
        .layer(from_fn_with_state(service, middleware::record_requests));

    let app = if config.cors_origins.is_empty() {
        app
    } else {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.cors_origins.clone()))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]),
        )
    };

    app.layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_routes() -> Router {
        Router::new().route("/v1/test", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn test_api_prefix_empty() {
        let app = build_router_with_prefix(test_routes(), "");

        let response = app
            .oneshot(Request::builder().uri("/v1/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_api_prefix_set() {
        let app = build_router_with_prefix(test_routes(), "/api");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        // Route should NOT work without prefix
        let response = app
            .oneshot(Request::builder().uri("/v1/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
