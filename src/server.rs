//! HTTP server setup.
//!
//! Every method and path is routed to the dispatcher; the endpoint list in
//! the configuration is the only route table.

use crate::config::Config;
use crate::dispatcher::dispatch;
use crate::error::ConfigError;
use crate::matcher::Matcher;
use crate::proxy::ProxyForwarder;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Read-only state shared by all requests.
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub matcher: Matcher,
    pub proxy: Option<ProxyForwarder>,
}

impl AppState {
    /// Build the shared state from a validated configuration.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let matcher = Matcher::new(&config.endpoints);
        let proxy = config.proxy_origin().map(ProxyForwarder::new).transpose()?;

        Ok(Self {
            config,
            matcher,
            proxy,
        })
    }
}

/// Axum router sending every request to the dispatcher.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

/// Mock HTTP server.
pub struct MockServer {
    state: Arc<AppState>,
}

impl MockServer {
    /// Create a server for a validated configuration.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let state = AppState::new(config)?;

        info!(
            endpoints = state.config.endpoints.len(),
            proxy_pass = state.config.proxy_origin().unwrap_or("-"),
            log_request_contents = state.config.logging.request_contents,
            log_response_contents = state.config.logging.response_contents,
            "Mock server initialized"
        );

        Ok(Self {
            state: Arc::new(state),
        })
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve on `listener` until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(address = %addr, "HTTP server starting");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
