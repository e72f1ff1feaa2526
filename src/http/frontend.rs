//! Plain HTTP routes served on the public port.
//!
//! # Routes
//! - `GET /`: liveness text
//! - `GET /health`: backend reachability and live connection count
//! - `GET /<subscription path>`: base64 connection descriptor
//!
//! Upgrade requests never get here; the connection dispatcher hands them to
//! the relay before hyper sees them.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::health::BackendHealth;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::net::ConnectionTracker;

/// State injected into front-end handlers.
#[derive(Clone)]
pub struct FrontendState {
    pub domain: Arc<str>,
    pub subscription: Arc<str>,
    pub health: Arc<BackendHealth>,
    pub tracker: ConnectionTracker,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub backend: &'static str,
    pub active_connections: u64,
}

/// Build the front-end router with all middleware layers.
#[allow(deprecated)]
pub fn router(state: FrontendState, subscription_path: &str, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route(&format!("/{}", subscription_path), get(subscription))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "http",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = %req.request_id(),
                    )
                }))
                .layer(propagate_request_id_layer())
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

async fn home(State(state): State<FrontendState>) -> String {
    format!("Relay running on {}", state.domain)
}

async fn health(State(state): State<FrontendState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        backend: state.health.state().as_str(),
        active_connections: state.tracker.active_count(),
    })
}

async fn subscription(State(state): State<FrontendState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.subscription.to_string(),
    )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = FrontendState {
            domain: Arc::from("relay.example.com"),
            subscription: Arc::from("dmxlc3M6Ly8="),
            health: Arc::new(BackendHealth::new()),
            tracker: ConnectionTracker::new(),
        };
        router(state, "sub", Duration::from_secs(5))
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String, Option<String>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap(), request_id)
    }

    #[tokio::test]
    async fn home_and_subscription() {
        let (status, body, request_id) = get_body(app(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Relay running on relay.example.com");
        assert!(request_id.is_some());

        let (status, body, _) = get_body(app(), "/sub").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "dmxlc3M6Ly8=");
    }

    #[tokio::test]
    async fn health_reports_unknown_backend() {
        let (status, body, _) = get_body(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "unknown");
        assert_eq!(json["active_connections"], 0);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _, _) = get_body(app(), "/speed").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
