//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that asks the drive for a health check

use crate::services::file_service::FileService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// HTTP 200 when the drive reports healthy, HTTP 503 with the failure otherwise.
pub async fn readyz(State(files): State<FileService>) -> impl IntoResponse {
    let drive = files.drive();
    let (status, error) = match drive.health_check().await {
        Ok(()) => (StatusCode::OK, None),
        Err(e) => {
            tracing::warn!("readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Some(e.to_string()))
        }
    };

    let body = ReadyResponse {
        status: if error.is_none() {
            "ok".into()
        } else {
            "error".into()
        },
        backend: drive.backend(),
        error,
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    backend: &'static str,
    error: Option<String>,
}
