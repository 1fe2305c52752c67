//! HTTP and WebSocket API server

mod actions;
mod auth;
mod error;
mod health;
mod websocket;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::plugins::PluginManager;
use crate::session::SessionServices;

pub use error::ApiError;

/// Shared state for API handlers
pub struct ApiState {
    pub services: SessionServices,
    pub plugins: Arc<PluginManager>,
    /// Bearer token required on protected routes; `None` allows everything
    pub api_key: Option<String>,
    /// Enables runtime tool registration
    pub developer_mode: bool,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

/// Builder for [`ApiServer`]
pub struct ApiServerBuilder {
    services: SessionServices,
    plugins: Arc<PluginManager>,
    api_key: Option<String>,
    developer_mode: bool,
    port: u16,
}

impl ApiServerBuilder {
    #[must_use]
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            plugins: Arc::new(PluginManager::new()),
            api_key: None,
            developer_mode: false,
            port: 8000,
        }
    }

    #[must_use]
    pub fn plugins(mut self, plugins: Arc<PluginManager>) -> Self {
        self.plugins = plugins;
        self
    }

    #[must_use]
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    #[must_use]
    pub const fn developer_mode(mut self, enabled: bool) -> Self {
        self.developer_mode = enabled;
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState {
                services: self.services,
                plugins: self.plugins,
                api_key: self.api_key,
                developer_mode: self.developer_mode,
            }),
            port: self.port,
        }
    }
}

impl ApiServer {
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .nest("/v1", actions::router(self.state.clone()))
            .nest("/ws", websocket::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or serve
    pub async fn run(self) -> Result<()> {
        if self.state.developer_mode {
            tracing::warn!("developer mode enabled: runtime tool registration is open");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Spawn the API server in the background
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
