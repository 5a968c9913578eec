//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use subsync_media::check_tool;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub active_jobs: usize,
}

/// Health check endpoint (liveness probe).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        active_jobs: state.service.store().len(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub storage: CheckStatus,
    pub detector: CheckStatus,
    pub normalizer: CheckStatus,
    pub synchronizer: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
        }
    }

    fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn tool(program: &str) -> Self {
        match check_tool(program) {
            Ok(_) => Self::ok(),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks the job storage directory and the three external tools.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let worker = state.service.config();

    let storage = match tokio::fs::metadata(&worker.base_dir).await {
        Ok(meta) if meta.is_dir() => CheckStatus::ok(),
        Ok(_) => CheckStatus::error("base path is not a directory"),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let checks = ReadinessChecks {
        storage,
        detector: CheckStatus::tool(&worker.tools.detector),
        normalizer: CheckStatus::tool(&worker.tools.normalizer),
        synchronizer: CheckStatus::tool(&worker.tools.synchronizer),
    };

    let all_ok = checks.storage.is_ok()
        && checks.detector.is_ok()
        && checks.normalizer.is_ok()
        && checks.synchronizer.is_ok();

    if all_ok {
        Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            checks,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready".to_string(),
                checks,
            }),
        ))
    }
}
