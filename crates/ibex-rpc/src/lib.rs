//! Ibex RPC - diagnostic HTTP and WebSocket API
//!
//! Serves the consensus status dump of running engines and streams their
//! commits and round changes to WebSocket clients.

pub mod error;
pub mod http;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use ibex_consensus::EngineHandle;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;

use http::{create_router, AppState};
use ws::{create_ws_router, forward_commits, forward_round_changes, EventBroadcaster};

pub use error::RpcError;
pub use http::handlers::{CheckpointResponse, HealthResponse};
pub use ws::WsEvent;

/// RPC server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// HTTP bind address
    pub http_addr: SocketAddr,
    /// Enable WebSocket
    pub enable_ws: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_ws: true,
        }
    }
}

/// RPC server
pub struct RpcServer {
    config: RpcConfig,
    app_state: Arc<AppState>,
}

impl RpcServer {
    pub fn new(config: RpcConfig, engines: Vec<EngineHandle>) -> Self {
        let app_state = Arc::new(AppState {
            engines,
            broadcaster: Arc::new(EventBroadcaster::default()),
        });

        RpcServer { config, app_state }
    }

    pub fn broadcaster(&self) -> Arc<EventBroadcaster> {
        Arc::clone(&self.app_state.broadcaster)
    }

    /// Start forwarding engine events to WebSocket clients.
    ///
    /// Commits come from the first engine only, so each block is announced
    /// once; round changes come from every engine.
    pub fn spawn_forwarders(&self) -> Vec<JoinHandle<()>> {
        let engines = &self.app_state.engines;
        let mut tasks: Vec<_> = engines
            .iter()
            .map(|handle| forward_round_changes(handle, self.broadcaster()))
            .collect();
        if let Some(first) = engines.first() {
            tasks.push(forward_commits(first, self.broadcaster()));
        }
        tasks
    }

    /// Create the combined router
    pub fn router(&self) -> Router {
        let http_router = create_router(Arc::clone(&self.app_state));

        if self.config.enable_ws {
            http_router.merge(create_ws_router(self.broadcaster()))
        } else {
            http_router
        }
    }

    /// Run the RPC server
    pub async fn run(self) -> Result<(), std::io::Error> {
        if self.config.enable_ws {
            self.spawn_forwarders();
        }
        let router = self.router();
        let addr = self.config.http_addr;

        info!("Starting RPC server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await
    }
}
