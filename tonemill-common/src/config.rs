//! Configuration loading and resolution
//!
//! Settings resolution priority:
//! 1. Command-line arguments (applied by the binary through [`ConfigOverrides`])
//! 2. Environment variables (`PORT`, `TONEMILL_MODEL_PATH`, `TONEMILL_CONFIG`)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing TOML file never prevents startup: a warning is logged and the
//! compiled defaults are used. A TOML file that exists but cannot be parsed
//! is a hard error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Maximum accepted upload size in bytes (10 MiB)
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Default HTTP listening port
pub const DEFAULT_PORT: u16 = 5000;

/// Default allow-set of audio container extensions
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a", "aac", "ogg"];

/// Default location of the transcription model artifact
pub const DEFAULT_MODEL_PATH: &str = "models/pitch-tracker.toml";

/// Environment variable holding the listening port
pub const PORT_ENV: &str = "PORT";

/// Environment variable holding the TOML config file path
pub const CONFIG_PATH_ENV: &str = "TONEMILL_CONFIG";

/// Environment variable holding the model artifact path
pub const MODEL_PATH_ENV: &str = "TONEMILL_MODEL_PATH";

/// Config file picked up from the working directory when nothing else is given
const LOCAL_CONFIG_FILE: &str = "tonemill.toml";

/// Service configuration
///
/// Every field has a compiled default, so an empty TOML file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upload size ceiling in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Accepted file extensions (case-insensitive, without leading dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Transcription model artifact location
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Directory for per-request temporary files (system temp dir if unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Upper bound on conversions running at the same time
    #[serde(default = "default_max_concurrent_conversions")]
    pub max_concurrent_conversions: usize,

    /// Per-conversion time limit in seconds
    #[serde(default = "default_conversion_timeout_secs")]
    pub conversion_timeout_secs: u64,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_file_size() -> usize {
    MAX_FILE_SIZE
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_PATH)
}

fn default_max_concurrent_conversions() -> usize {
    2
}

fn default_conversion_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
            model_path: default_model_path(),
            temp_dir: None,
            max_concurrent_conversions: default_max_concurrent_conversions(),
            conversion_timeout_secs: default_conversion_timeout_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Values supplied on the command line or through the environment
///
/// `None` leaves the file/default value untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub model_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ServiceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from an optional TOML file
    ///
    /// `None` or a missing file yields the compiled defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No config file given, using compiled defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply command-line/environment overrides on top of file values
    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(model_path) = overrides.model_path {
            self.model_path = model_path;
        }
        if let Some(temp_dir) = overrides.temp_dir {
            self.temp_dir = Some(temp_dir);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self
    }

    /// Normalize and validate the configuration
    ///
    /// Extensions are lowercased, stripped of a leading dot and deduplicated
    /// (first occurrence wins, so the configured order is kept for messages).
    pub fn validated(mut self) -> Result<Self> {
        let mut extensions: Vec<String> = Vec::with_capacity(self.allowed_extensions.len());
        for raw in &self.allowed_extensions {
            let ext = raw.trim().trim_start_matches('.').to_ascii_lowercase();
            if ext.is_empty() {
                return Err(Error::Config(format!(
                    "Invalid allowed extension: {:?}",
                    raw
                )));
            }
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        self.allowed_extensions = extensions;

        if self.allowed_extensions.is_empty() {
            return Err(Error::Config(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(Error::Config("max_file_size must be > 0".to_string()));
        }
        if self.max_concurrent_conversions == 0 {
            return Err(Error::Config(
                "max_concurrent_conversions must be > 0".to_string(),
            ));
        }
        if self.conversion_timeout_secs == 0 {
            return Err(Error::Config(
                "conversion_timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(self)
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-conversion time limit
    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs)
    }
}

/// Resolve which TOML config file to read
///
/// Priority: explicit path → `TONEMILL_CONFIG` → `./tonemill.toml` if present.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    None
}
