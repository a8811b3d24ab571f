//! Drowsiness Monitor API Server
//!
//! Streams annotated frames as MJPEG and exposes session, alert and health
//! status. Every `/video_feed` client runs its own detection session.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub mod config;
pub mod overlay;
pub mod pipeline;
mod routes;
pub mod stream;
pub mod viewer;

pub use config::AppConfig;
pub use routes::sessions::SessionSnapshot;

use alerting::{AlertDispatcher, AlertEvent, AlertStatsSnapshot};
use camera_capture::CameraError;
use dms::{load_detector, DetectorBackend, DmsConfig, DmsError, EyeDetector, OnnxEyeDetector};

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Replay line {line}: {reason}")]
    Replay { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session {0} is already streaming")]
    SessionConflict(Uuid),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Camera(CameraError::Open(_))
            | ApiError::Dms(DmsError::DetectorUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::SessionConflict(_) => StatusCode::CONFLICT,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("Request failed ({}): {}", status, self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds a fresh detector for each session
pub type DetectorFactory =
    Arc<dyn Fn() -> Result<Box<dyn EyeDetector>, DmsError> + Send + Sync>;

/// Application state shared across handlers
pub struct AppState {
    /// Loaded configuration
    pub config: AppConfig,
    /// Detector for new sessions
    pub detector: DetectorFactory,
    /// Audio alert dispatch
    pub dispatcher: AlertDispatcher,
    /// Live streaming sessions
    pub sessions: RwLock<HashMap<Uuid, SessionSnapshot>>,
    /// Most recent alerts, newest last
    pub alerts: RwLock<VecDeque<AlertEvent>>,
    /// Prometheus exporter, if installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: AppConfig, detector: DetectorFactory, dispatcher: AlertDispatcher) -> Self {
        Self {
            config,
            detector,
            dispatcher,
            sessions: RwLock::new(HashMap::new()),
            alerts: RwLock::new(VecDeque::new()),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Append to the bounded alert log (call from blocking threads)
    pub fn record_alert_blocking(&self, event: AlertEvent) {
        let capacity = self.config.server.alert_history.max(1);
        let mut alerts = self.alerts.blocking_write();
        while alerts.len() >= capacity {
            alerts.pop_front();
        }
        alerts.push_back(event);
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub alerts: AlertStatsSnapshot,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::index::index))
        .route("/video_feed", get(stream::video_feed))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/sessions", get(routes::sessions::get_sessions))
        .route("/api/v1/sessions/:id", get(routes::sessions::get_session))
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_sessions: state.sessions.read().await.len(),
        alerts: state.dispatcher.stats(),
    })
}

/// Prometheus exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

/// Initialize logging
///
/// Level comes from `RUST_LOG` (default `info`). Logs go to stderr, stdout
/// is reserved for replay output. Safe to call twice.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        warn!("Tracing subscriber already installed");
    }
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, ApiError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    metrics::describe_counter!("dms_frames_total", "Frames analyzed across all sessions");
    metrics::describe_counter!("dms_alerts_fired_total", "Drowsiness alerts dispatched");
    metrics::describe_gauge!("dms_active_sessions", "Live streaming sessions");
    metrics::describe_counter!("alert_playback_failures_total", "Alert sounds that failed to play");
    Ok(handle)
}

/// Detector factory for the configured backend
///
/// The detector is loaded once up front, so the server never starts without
/// a working one. ONNX sessions share that plan; cascade sessions each load
/// their own classifier.
pub fn detector_factory(config: &DmsConfig) -> Result<DetectorFactory, ApiError> {
    match config.detector {
        DetectorBackend::Onnx => {
            let template = OnnxEyeDetector::load(config)?;
            Ok(Arc::new(move || -> Result<Box<dyn EyeDetector>, DmsError> {
                Ok(Box::new(template.clone()))
            }))
        }
        DetectorBackend::Cascade => {
            load_detector(config)?;
            let config = config.clone();
            Ok(Arc::new(move || -> Result<Box<dyn EyeDetector>, DmsError> {
                load_detector(&config)
            }))
        }
    }
}

/// Run the server
pub async fn run_server(config: AppConfig) -> Result<(), ApiError> {
    let detector = detector_factory(&config.dms)?;
    let dispatcher =
        AlertDispatcher::from_config(&config.alert, tokio::runtime::Handle::current());
    let addr = config.server.addr.clone();

    let mut state = AppState::new(config, detector, dispatcher);
    match init_metrics() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("Metrics disabled: {}", e),
    }
    let app = create_router(Arc::new(state));

    info!("Starting drowsiness stream server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
