use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: ComponentHealth,
    pub transcoder: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn ok(start: std::time::Instant) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
        }
    }
}

/// GET /health: job store reachability and transcoder availability.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let store_check = match state.store.health_check().await {
        Ok(()) => ComponentHealth::ok(start),
        Err(e) => {
            tracing::warn!(error = %e, "Job store health check failed");
            ComponentHealth::error()
        }
    };

    let ffmpeg_start = std::time::Instant::now();
    let transcoder_check = if state.transcoder.is_available().await {
        ComponentHealth::ok(ffmpeg_start)
    } else {
        ComponentHealth::error()
    };

    let all_healthy = store_check.status == "ok" && transcoder_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            job_store: store_check,
            transcoder: transcoder_check,
        },
    };

    (status_code, Json(response))
}
