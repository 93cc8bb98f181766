//! HTTP server
//!
//! Routes:
//! - `GET  /files/{name}`: serve a stored artifact
//! - `POST /upload`: multipart upload of a single `file` field
//! - `GET  /tools`: list tool definitions
//! - `POST /tools/call`: run a tool with `{ name, arguments }`
//! - `GET  /health`: liveness

pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::enhance::{EnhanceError, EnhancementClient, Enhancer};
use crate::media::inline::max_encoded_len;
use crate::media::{ContentStore, MediaError, MediaIngestor, RemoteFetcher};
use crate::tools::{create_registry, ToolRegistry};

/// Headroom for multipart framing on top of the image size ceiling.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Headroom for the JSON envelope and other arguments around an inline payload.
const TOOL_CALL_OVERHEAD_BYTES: usize = 64 * 1024;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Media setup failed: {0}")]
    Media(#[from] MediaError),

    #[error("Enhancement client setup failed: {0}")]
    Enhance(#[from] EnhanceError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<MediaIngestor>,
    pub registry: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(ingestor: Arc<MediaIngestor>, registry: Arc<ToolRegistry>) -> Self {
        Self { ingestor, registry }
    }

    /// Wire the pipeline, the optional backend client and the tools from `config`.
    pub async fn from_config(config: &Config) -> Result<Self, ServerError> {
        let store = ContentStore::open(&config.storage_dir, config.public_base_url()).await?;
        let fetcher = RemoteFetcher::new(config.fetch_config())?;
        let ingestor = Arc::new(MediaIngestor::new(config.ingest_policy, fetcher, store));

        let enhancer = match &config.backend_url {
            Some(url) => {
                let mut client = EnhancementClient::new(url.as_str(), config.backend_timeout())?;
                if let Some(key) = &config.backend_api_key {
                    client = client.with_api_key(key.as_str());
                }
                Some(Arc::new(client) as Arc<dyn Enhancer>)
            }
            None => {
                tracing::warn!("No enhancement backend configured; enhance_image will report errors");
                None
            }
        };

        let registry = Arc::new(create_registry(ingestor.clone(), enhancer));
        Ok(Self::new(ingestor, registry))
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let upload_limit = state
        .ingestor
        .max_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let tool_call_limit = tool_call_body_limit(state.ingestor.max_bytes());

    Router::new()
        .route("/files/{name}", get(handlers::file_handler))
        .route(
            "/upload",
            post(handlers::upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/tools", get(handlers::list_tools_handler))
        .route(
            "/tools/call",
            post(handlers::call_tool_handler).layer(DefaultBodyLimit::max(tool_call_limit)),
        )
        .route("/health", get(handlers::health_handler))
        .with_state(state)
}

/// Largest `/tools/call` body that can still carry an inline image at the
/// ceiling. Line-wrapped payloads arrive with an escaped `\n` every 76
/// characters, so a sixteenth is added on top of the base64 length.
fn tool_call_body_limit(max_bytes: usize) -> usize {
    let encoded = max_encoded_len(max_bytes);
    encoded
        .saturating_add(encoded / 16)
        .saturating_add(TOOL_CALL_OVERHEAD_BYTES)
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn serve(config: &Config) -> Result<(), ServerError> {
    let addr = config.bind_addr()?;
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        public_base_url = %config.public_base_url(),
        policy = %config.ingest_policy,
        "Starting retouch server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
