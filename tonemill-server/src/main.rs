//! tonemill-server - audio-to-MIDI conversion service
//!
//! Loads the transcription model once, then serves `POST /convert`,
//! `GET /health` and `GET /`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tonemill_common::config::{
    resolve_config_path, CONFIG_PATH_ENV, MODEL_PATH_ENV, PORT_ENV,
};
use tonemill_common::{ConfigOverrides, ServiceConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tonemill_server::model::ModelHandle;
use tonemill_server::AppState;

/// Command-line arguments for tonemill-server
#[derive(Parser, Debug)]
#[command(name = "tonemill-server")]
#[command(about = "Audio-to-MIDI conversion service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = PORT_ENV)]
    port: Option<u16>,

    /// Transcription model artifact
    #[arg(short, long, env = MODEL_PATH_ENV)]
    model: Option<PathBuf>,

    /// Directory for temporary upload files
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration is read before tracing starts so the file can set the
    // log level; load problems are reported once logging is up
    let config_path = resolve_config_path(args.config.as_deref());
    let loaded = ServiceConfig::load(config_path.as_deref()).and_then(|config| {
        config
            .apply(ConfigOverrides {
                host: args.host,
                port: args.port,
                model_path: args.model,
                temp_dir: args.temp_dir,
                log_level: args.log_level,
            })
            .validated()
    });

    let level = loaded
        .as_ref()
        .map(|config| config.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "tonemill_server={level},tonemill_common={level},tower_http={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Tonemill MIDI Converter (tonemill-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = loaded.context("Invalid configuration")?;
    match &config_path {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        Some(path) => warn!("Configuration file {} not found, using defaults", path.display()),
        None => info!("No configuration file, using defaults"),
    }
    info!(
        "Accepting {} up to {} bytes; {} concurrent conversions, {}s limit",
        config.allowed_extensions.join(", "),
        config.max_file_size,
        config.max_concurrent_conversions,
        config.conversion_timeout_secs
    );

    if let Some(dir) = &config.temp_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create temp directory {}", dir.display()))?;
    }

    // Loaded once before accepting traffic; a failed load keeps the service
    // up in degraded mode
    let model = ModelHandle::load(&config.model_path);
    if !model.is_available() {
        warn!("Serving without a transcription model; /convert will fail until restart");
    }

    let addr = config.bind_address();
    let app = tonemill_server::build_router(AppState::new(config, model));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
