//! Layered application configuration
//!
//! Built-in defaults, then an optional TOML file, then `DROWSY__*`
//! environment variables (`DROWSY__DMS__DROWSINESS_THRESHOLD_MS=1500`).

use alerting::AlertConfig;
use camera_capture::CameraConfig;
use ::config::{Config, ConfigError, Environment, File, FileFormat};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file looked up when none is given
pub const DEFAULT_CONFIG_FILE: &str = "drowsiness.toml";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// Alert events kept for `/api/v1/alerts`
    pub alert_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            alert_history: 100,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub dms: DmsConfig,
    pub alert: AlertConfig,
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit `path` must exist; otherwise `drowsiness.toml` is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE)
                .format(FileFormat::Toml)
                .required(false),
        };

        Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("DROWSY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
