use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info};

use crate::api::AppState;
use crate::health::{HealthState, HealthStatus};

pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let health_status = state.health.check_health().await;

    if matches!(health_status.status, HealthState::Unhealthy) {
        error!("❌ Health check failed - service unhealthy");
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe - storage must be reachable
pub async fn readiness(
    state: State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let result = health(state).await;
    if result.is_ok() {
        info!("✅ Readiness check passed");
    }
    result
}

/// Liveness probe
pub async fn liveness() -> &'static str {
    "OK"
}
