//! HTTP handlers for the Orca webhook relay
//!
//! The route table is built explicitly from configuration in [`create_routes`].

use crate::error::OrcaError;
use crate::sender::example_row;
use crate::service::AppState;
use crate::HealthStatus;
use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Create all routes for the relay
pub fn create_routes(state: Arc<AppState>) -> Router {
    let config = &state.config;

    let mut router = Router::new()
        .route(&config.observability.health_path, get(health_check))
        .route("/health/live", get(liveness_check))
        .route(
            &config.receiver.path,
            post(orca_webhook_handler)
                .layer(DefaultBodyLimit::max(config.receiver.max_body_size)),
        );

    if config.sender.trigger_enabled {
        router = router.route(&config.sender.trigger_path, post(trigger_webhook_in));
    }

    if config.observability.metrics_enabled {
        router = router.route(&config.observability.metrics_path, get(metrics_handler));
    }

    router.with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthStatus::healthy(state.started_at)))
}

/// Liveness check endpoint (for Kubernetes)
async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "alive"})))
}

/// Metrics endpoint (Prometheus format)
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.export() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Orca "webhook out" endpoint
async fn orca_webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => state.receiver.respond(&body).await,
        // Oversized bodies keep the framework's 413
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            rejection.into_response()
        }
        Err(rejection) => OrcaError::body_read(rejection.body_text()).into_response(),
    }
}

/// Sends a row to Orca and answers `OK` whatever the outcome.
///
/// No body is needed: an empty body sends the example row. A non-empty body is
/// sent instead, and must be a JSON object of string column values; anything
/// else is refused with `400` before any outbound call.
async fn trigger_webhook_in(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let fields = if body.is_empty() {
        example_row()
    } else {
        match serde_json::from_slice::<BTreeMap<String, String>>(&body) {
            Ok(fields) => fields,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Invalid row: {}", e)).into_response()
            }
        }
    };

    let outcome = state.sender.send_add_row_event(fields).await;
    info!(outcome = outcome.label(), "Trigger completed");

    (StatusCode::OK, "OK").into_response()
}
