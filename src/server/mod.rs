//! Development server
//!
//! Serves the output tree over HTTP. With live reload on, every HTML page gets
//! a small client script that listens on an SSE endpoint, and a watcher on the
//! output tree broadcasts a reload whenever a build writes new files.

pub mod reload;

pub use reload::{inject_script, LiveReload, ReloadEvent, RELOAD_PATH};

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::watch::WatchError;

/// Errors that can occur while serving
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[source] std::io::Error),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Build the router for an output root.
///
/// Requests for a directory serve its `index.html`. When `live_reload` is
/// set, the SSE endpoint is mounted and HTML responses get the client script.
pub fn router(root: &Path, live_reload: Option<LiveReload>) -> Router {
    let files = ServeDir::new(root).append_index_html_on_directories(true);

    match live_reload {
        Some(reload) => Router::new()
            .route(RELOAD_PATH, get(reload::events_handler))
            .fallback_service(files)
            .layer(middleware::from_fn(inject_reload_client))
            .with_state(reload),
        None => Router::new().fallback_service(files),
    }
}

async fn inject_reload_client(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response.status() == StatusCode::OK
        && response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to buffer HTML response: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Serve `root` until ctrl-c.
///
/// With live reload on, the output tree is watched for the lifetime of the
/// server and each debounced batch of changes is broadcast to the browsers.
pub async fn serve(root: PathBuf, config: &ServerConfig, debounce: Duration) -> Result<(), ServerError> {
    std::fs::create_dir_all(&root)
        .map_err(|source| ServerError::Prepare { path: root.clone(), source })?;

    let live_reload = config.live_reload.then(LiveReload::new);
    let _watcher = match &live_reload {
        Some(reload) => Some(reload::watch_output(&root, debounce, reload.clone())?),
        None => None,
    };

    let app = router(&root, live_reload);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;

    info!("Serving {} at http://{}", root.display(), addr);
    if config.live_reload {
        info!("Live reload enabled");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Io)?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
    }
}
