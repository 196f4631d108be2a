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
    pub pipeline: ComponentHealth,
    pub storage: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
}

/// GET /health — process health with pipeline and storage status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let pipeline_check = if state.pipeline.queue_status().is_processing {
        ComponentHealth {
            status: "ok".to_string(),
        }
    } else {
        ComponentHealth {
            status: "stopped".to_string(),
        }
    };

    let storage_check = match tokio::fs::metadata(&state.config.screenshot_dir).await {
        Ok(meta) if meta.is_dir() => ComponentHealth {
            status: "ok".to_string(),
        },
        _ => ComponentHealth {
            status: "error".to_string(),
        },
    };

    let all_healthy = pipeline_check.status == "ok" && storage_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            pipeline: pipeline_check,
            storage: storage_check,
        },
    };

    (status_code, Json(response))
}
