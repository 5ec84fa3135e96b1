//! Client WebSocket Transport
//!
//! axum WebSocket endpoint plus the per-connection session that bridges a
//! socket to the hub.

pub mod server;
pub mod session;

pub use server::{ServerError, WS_PATH, WsServer, router, serve};
pub use session::{ChannelTransport, Session, SessionContext, SessionEvent};
