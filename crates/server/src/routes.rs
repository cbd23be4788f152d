use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /
pub async fn greeting() -> &'static str {
    "Good afternoon!"
}

/// GET /user
pub async fn user_greeting() -> &'static str {
    "Good afternoon user!"
}

/// GET /health
pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /metrics
///
/// All registered counters in the Prometheus text exposition format.
pub async fn get_metrics(State(state): State<SharedState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("failed to encode metrics: {}", e),
            )
        }
    }
}
