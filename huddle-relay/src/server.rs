use crate::config::RelayConfig;
use crate::signaling::{RelayState, ws_handler};
use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ws/{room}/{participant}", get(ws_handler))
        .with_state(state)
}

/// A relay listening in the background.
pub struct RelayServer {
    addr: SocketAddr,
    state: RelayState,
    task: JoinHandle<()>,
}

impl RelayServer {
    /// Binds `config.bind` and starts serving. Port 0 picks a free port;
    /// [`RelayServer::local_addr`] tells which.
    pub async fn start(config: RelayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let addr = listener.local_addr()?;
        let state = RelayState::new(&config);
        let app = router(state.clone());

        info!("Relay listening on {}", addr);
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Relay server stopped: {}", e);
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base WebSocket URL for clients, e.g. `ws://127.0.0.1:8080`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}
