//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::{AppState, SERVICE_NAME};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" with a loaded model, "degraded" without one
    pub status: String,
    pub service: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Accepted upload extensions, in configured order
    pub supported_formats: Vec<String>,
    pub model: ModelStatus,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Last server-side conversion failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// GET /health
///
/// Always 200: a missing model degrades the service but the process is up.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let model = state.model();
    let available = model.is_available();
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if available { "healthy" } else { "degraded" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_formats: state.pipeline.validator().allowed_extensions().to_vec(),
        model: ModelStatus {
            available,
            name: model.name(),
        },
        uptime_seconds,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
