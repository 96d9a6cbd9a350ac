//! tonemill-server library interface
//!
//! Exposes the router, shared state and conversion pipeline so integration
//! tests can drive the service without binding a socket.

pub mod api;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod utils;

pub use crate::error::{ConvertError, ConvertResult, Rejection};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tonemill_common::ServiceConfig;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::model::ModelHandle;
use crate::pipeline::ConversionPipeline;

/// Name reported by `/` and `/health`
pub const SERVICE_NAME: &str = "Tonemill MIDI Converter";

/// Room for multipart boundaries and part headers on top of the file itself
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub pipeline: ConversionPipeline,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Most recent server-side conversion failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(config: ServiceConfig, model: ModelHandle) -> Self {
        let pipeline = ConversionPipeline::new(&config, model);
        Self {
            config: Arc::new(config),
            pipeline,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn model(&self) -> &ModelHandle {
        self.pipeline.model()
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    let routes = Router::new()
        .merge(api::index_routes())
        .merge(api::health_routes())
        .merge(api::convert_routes().layer(DefaultBodyLimit::max(body_limit)));

    service_layers(routes).with_state(state)
}

/// Request tracing and panic recovery, applied around every route
pub fn service_layers<S>(routes: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(pipeline::response::panic_response))
}
