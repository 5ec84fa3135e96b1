//! WebSocket Server
//!
//! Accepts client connections at `GET /ws?userId=<id>` and hands each
//! upgraded socket to a [`Session`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, ws::WebSocketUpgrade},
    response::Response,
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::session::{Session, SessionContext};
use crate::domain::connection::{ANONYMOUS_CLIENT_ID, ClientId};

/// Path clients connect to.
pub const WS_PATH: &str = "/ws";

// =============================================================================
// Router
// =============================================================================

#[derive(Debug, Clone)]
struct WsState {
    context: Arc<SessionContext>,
    cancel: CancellationToken,
}

/// Handshake query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectParams {
    user_id: Option<String>,
}

impl ConnectParams {
    fn client_id(self) -> ClientId {
        self.user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ANONYMOUS_CLIENT_ID.to_string())
    }
}

/// Build the client-facing router.
///
/// Sessions end when `cancel` fires.
pub fn router(context: Arc<SessionContext>, cancel: CancellationToken) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .with_state(WsState { context, cancel })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<WsState>,
) -> Response {
    let client_id = params.client_id();
    tracing::debug!(client_id = %client_id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| {
        Session::new(client_id, state.context).run(socket, state.cancel)
    })
}

// =============================================================================
// Server
// =============================================================================

/// Client WebSocket server.
pub struct WsServer {
    port: u16,
    context: Arc<SessionContext>,
    cancel: CancellationToken,
}

impl WsServer {
    /// Create a new WebSocket server.
    #[must_use]
    pub const fn new(port: u16, context: Arc<SessionContext>, cancel: CancellationToken) -> Self {
        Self {
            port,
            context,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the server stops with an
    /// I/O error.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, path = WS_PATH, "WebSocket server listening");
        serve(listener, self.context, self.cancel).await?;
        tracing::info!("WebSocket server stopped");
        Ok(())
    }
}

/// Serve client connections on an already bound listener until cancelled.
///
/// # Errors
///
/// Returns `ServerError::ServerFailed` if the server stops with an I/O error.
pub async fn serve(
    listener: TcpListener,
    context: Arc<SessionContext>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    axum::serve(listener, router(context, cancel.clone()))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| ServerError::ServerFailed(e.to_string()))
}

// =============================================================================
// Errors
// =============================================================================

/// WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
