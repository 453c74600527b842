//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::monitor::Monitor;
use crate::probe::{HttpProber, NameResolver, Prober, SystemResolver};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
pub struct AppState<P = HttpProber, R = SystemResolver> {
    pub monitor: Arc<Monitor<P, R>>,
}

impl<P, R> Clone for AppState<P, R> {
    fn clone(&self) -> Self {
        Self {
            monitor: self.monitor.clone(),
        }
    }
}

/// Build the router with all routes.
pub fn router<P: Prober, R: NameResolver>(state: AppState<P, R>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::handle_root))
        .route("/start", post(handlers::handle_start::<P, R>))
        .route("/stop", post(handlers::handle_stop::<P, R>))
        .route("/status", get(handlers::handle_status::<P, R>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

/// Web server for ServerPulse.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, monitor: Arc<Monitor>) -> Self {
        Self {
            config,
            state: AppState { monitor },
        }
    }

    /// Serve until Ctrl-C.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = router(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
