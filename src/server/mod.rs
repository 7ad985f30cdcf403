//! # HTTP Server for the Image Proxy
//!
//! One mounted prefix; everything below it is an upstream URL plus optional
//! transform segments, interpreted by [`crate::normalize`].
//!
//! ## Usage
//!
//! ```bash
//! espejo serve --listen 0.0.0.0:8080 --cache-dir /var/cache/espejo
//! ```

pub mod assets;
mod handlers;
mod state;

pub use state::{AppState, ServerConfig};

use axum::{http::StatusCode, routing::get, Router};
use std::sync::Arc;

use crate::error::EspejoError;

/// Start the HTTP server.
///
/// ## Example
///
/// ```no_run
/// use espejo::config::ProxyConfig;
/// use espejo::server::{serve, ServerConfig};
///
/// # async fn example() -> Result<(), espejo::error::EspejoError> {
/// let config = ServerConfig {
///     listen_addr: "0.0.0.0:8080".to_string(),
///     proxy: ProxyConfig::default(),
/// };
///
/// serve(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve(config: ServerConfig) -> Result<(), EspejoError> {
    let state = Arc::new(AppState::new(config.proxy)?);
    let app = router(state);

    println!("[server] espejo starting");
    println!("[server] Listening on: {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| {
            EspejoError::Server(format!("Failed to bind to {}: {}", config.listen_addr, e))
        })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| EspejoError::Server(format!("Server error: {}", e)))?;

    Ok(())
}

/// Build the router. Split out of [`serve`] so tests can drive the app
/// without touching a real listen address.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(not_found))
        .route("/favicon.ico", get(not_found))
        .route("/*path", get(handlers::proxy::proxy))
        .with_state(state)
}

/// Bare mount point and favicon probes short-circuit to 404.
async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
