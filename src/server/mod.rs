//! HTTP server
//!
//! Axum router over the session store, the segmentation processor and the
//! optional face detector. Heavy image work runs on the blocking pool.

pub mod error;
mod routes;

pub use error::ApiError;

use crate::{
    config::ServerConfig,
    error::Result,
    face::FaceDetector,
    processor::BackgroundRemovalProcessor,
    services::UploadValidator,
    session::SessionStore,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionStore>,
    pub processor: Arc<Mutex<BackgroundRemovalProcessor>>,
    pub face_detector: Option<Arc<dyn FaceDetector>>,
    pub validator: Arc<UploadValidator>,
    /// Fixed by configuration; read by handlers without touching the processor lock
    pub model_available: bool,
    /// Set once a segmentation run has initialized the backend
    pub model_loaded: Arc<AtomicBool>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("face_detector", &self.face_detector.is_some())
            .field("model_available", &self.model_available)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state from parts; tests inject a mock processor and detector
    #[must_use]
    pub fn new(
        config: ServerConfig,
        processor: BackgroundRemovalProcessor,
        face_detector: Option<Arc<dyn FaceDetector>>,
    ) -> Self {
        Self {
            model_available: processor.is_available(),
            model_loaded: Arc::new(AtomicBool::new(processor.is_initialized())),
            sessions: Arc::new(SessionStore::from_config(&config)),
            validator: Arc::new(UploadValidator::from_config(&config)),
            processor: Arc::new(Mutex::new(processor)),
            face_detector,
            config: Arc::new(config),
        }
    }

    pub(crate) fn mark_model_loaded(&self) {
        self.model_loaded.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_model_loaded(&self) -> bool {
        self.model_loaded.load(Ordering::Acquire)
    }

    /// Build the processor and face detector the configuration names
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Face model configured but unreadable
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let processor = BackgroundRemovalProcessor::new(config.processor_config());
        if !processor.is_available() {
            warn!("No segmentation model configured; background removal will answer 503");
        }
        let face_detector = load_face_detector(&config)?;
        Ok(Self::new(config, processor, face_detector))
    }
}

#[cfg(feature = "face-detection")]
fn load_face_detector(config: &ServerConfig) -> Result<Option<Arc<dyn FaceDetector>>> {
    match &config.face_model_path {
        Some(path) => {
            let detector = crate::face::RustfaceDetector::from_path(path)?;
            info!("Face detection enabled with {}", path.display());
            Ok(Some(Arc::new(detector)))
        },
        None => {
            info!("No face model configured; auto-process falls back to centered crops");
            Ok(None)
        },
    }
}

#[cfg(not(feature = "face-detection"))]
fn load_face_detector(config: &ServerConfig) -> Result<Option<Arc<dyn FaceDetector>>> {
    if config.face_model_path.is_some() {
        warn!("Face model configured but face detection is not compiled in");
    }
    Ok(None)
}

/// All routes with body limit, timeout, tracing and optional CORS layers
pub fn router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let router = Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/specs", get(routes::specs))
        .route("/upload", post(routes::upload))
        .route("/set-size", post(routes::set_size))
        .route("/set-crop", post(routes::set_crop))
        .route("/remove-background", post(routes::remove_background))
        .route("/auto-process", post(routes::auto_process))
        .route("/download/{session_id}", get(routes::download))
        .route("/download-sheet/{session_id}", get(routes::download_sheet))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit()))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http());

    if config.cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Bind, serve until Ctrl-C or SIGTERM, then stop the session sweeper
///
/// # Errors
/// - Invalid configuration or face model
/// - Address already in use
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let addr = state.config.socket_addr()?;

    let sweeper = Arc::clone(&state.sessions).spawn_sweeper(state.config.sweep_interval());
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Passport photo server listening on http://{addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    info!("Server stopped");
    served.map_err(anyhow::Error::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
