use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Full health snapshot: 200 while healthy or degraded, 503 once unhealthy.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state
        .metrics
        .check_health(&state.thresholds, state.started_at);

    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

pub async fn liveness_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(LivenessResponse {
            status: "alive".to_string(),
        }),
    )
}
