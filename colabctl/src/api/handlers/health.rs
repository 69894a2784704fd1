use axum::{Json, extract::State};
use chrono::Utc;

use crate::AppState;
use crate::api::models::health::{GpuAvailability, HealthResponse};

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Service health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let gpus = state.sessions.gpus();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        gpus: GpuAvailability {
            available: gpus.available(),
            total: gpus.capacity(),
        },
    })
}
