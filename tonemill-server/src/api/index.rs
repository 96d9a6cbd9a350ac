//! Service index

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::{AppState, SERVICE_NAME};

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub message: String,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub convert: &'static str,
}

/// GET /
pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: format!("{} API", SERVICE_NAME),
        endpoints: Endpoints {
            health: "/health",
            convert: "/convert (POST with audio file)",
        },
    })
}

pub fn index_routes() -> Router<AppState> {
    Router::new().route("/", get(index))
}
