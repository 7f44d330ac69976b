//! Query HTTP server.
//!
//! Binds the configured address and serves the query routes until the
//! cancellation token fires, then shuts down gracefully.

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::services::api::api_routes;
use crate::services::query::QueryService;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A bound, not yet running, query server.
pub struct QueryServer {
    listener: TcpListener,
    app: Router,
}

impl QueryServer {
    /// Bind `host:port` and build the router over `query`.
    pub async fn bind(config: &ServerConfig, query: QueryService) -> Result<Self, AppError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            AppError::config_key(format!("Failed to bind to {}: {}", addr, e), "PORT")
        })?;

        Ok(Self {
            listener,
            app: api_routes(query),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        self.listener
            .local_addr()
            .map_err(|e| AppError::internal(format!("Failed to read bound address: {}", e)))
    }

    /// Serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AppError> {
        if let Ok(addr) = self.local_addr() {
            log::info!("[server] Listening on http://{}", addr);
        }

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await
            .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

        log::info!("[server] Server stopped");
        Ok(())
    }
}
