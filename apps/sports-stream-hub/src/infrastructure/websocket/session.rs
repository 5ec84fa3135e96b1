//! Client Session
//!
//! One session per accepted WebSocket. The session owns the socket writer
//! and the connection's lifecycle state; a reader task turns incoming
//! frames into [`SessionEvent`]s, and outbound frames arrive on the bounded
//! queue behind [`ChannelTransport`].
//!
//! ```text
//! reader task ──SessionEvent──┐
//!                             ├──> session loop ──> socket writer
//! Broadcaster ──Frame (queue)─┘
//! ```

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::services::{Broadcaster, Hub, HubError, MessageRouter, Origin};
use crate::domain::connection::{
    ClientId, Connection, ConnectionId, ConnectionState, Frame, LifecycleEvent, SendError,
    Transport,
};
use crate::domain::protocol::OutboundMessage;
use crate::infrastructure::config::WelcomeSettings;

/// Capacity of the reader-to-session event channel.
const SESSION_EVENT_CAPACITY: usize = 64;

// =============================================================================
// Transport Adapter
// =============================================================================

/// [`Transport`] backed by a bounded tokio channel drained by the session.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<Frame>,
}

impl ChannelTransport {
    /// Wrap the sending half of a session's outbound queue.
    #[must_use]
    pub const fn new(sender: mpsc::Sender<Frame>) -> Self {
        Self { sender }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// =============================================================================
// Session Events
// =============================================================================

/// Discrete inputs to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A text frame from the client.
    Inbound {
        /// Frame payload.
        text: String,
        /// When the frame was read off the socket.
        received_at: DateTime<Utc>,
    },
    /// The client closed the socket or the read side failed.
    TransportClosed,
    /// The server is shutting down.
    Shutdown,
}

impl SessionEvent {
    /// Lifecycle transition this event causes, if any.
    #[must_use]
    pub const fn lifecycle(&self) -> Option<LifecycleEvent> {
        match self {
            Self::Inbound { .. } => None,
            Self::TransportClosed => Some(LifecycleEvent::TransportClosed),
            Self::Shutdown => Some(LifecycleEvent::Shutdown),
        }
    }
}

// =============================================================================
// Session Context
// =============================================================================

/// Shared services every session needs.
#[derive(Debug)]
pub struct SessionContext {
    hub: Arc<Hub>,
    broadcaster: Arc<Broadcaster>,
    router: MessageRouter,
    welcome: WelcomeSettings,
    queue_capacity: usize,
}

impl SessionContext {
    /// Build a session context around a broadcaster and its hub.
    #[must_use]
    pub fn new(broadcaster: Arc<Broadcaster>, welcome: WelcomeSettings, queue_capacity: usize) -> Self {
        Self {
            hub: Arc::clone(broadcaster.hub()),
            router: MessageRouter::new(Arc::clone(&broadcaster)),
            broadcaster,
            welcome,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// The hub sessions register with.
    #[must_use]
    pub const fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    fn welcome_for(&self, client_id: &str) -> OutboundMessage {
        OutboundMessage::Welcome {
            user_id: client_id.to_string(),
            message: self.welcome.message.clone(),
            features: self.welcome.features.clone(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// A single client's WebSocket session.
pub struct Session {
    client_id: ClientId,
    connection_id: ConnectionId,
    state: ConnectionState,
    context: Arc<SessionContext>,
}

impl Session {
    /// Create a session for `client_id`. Nothing is registered until
    /// [`Session::run`].
    #[must_use]
    pub fn new(client_id: ClientId, context: Arc<SessionContext>) -> Self {
        Self {
            client_id,
            connection_id: Hub::next_connection_id(),
            state: ConnectionState::Connecting,
            context,
        }
    }

    /// Connection identifier allocated for this session.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drive the session until the client leaves or `cancel` fires.
    pub async fn run(mut self, socket: WebSocket, cancel: CancellationToken) {
        let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(self.context.queue_capacity);
        let transport = Arc::new(ChannelTransport::new(frame_tx));
        let (mut writer, mut reader) = socket.split();

        let connection = Connection::open(self.connection_id, transport.clone());
        if let Err(HubError::ShuttingDown) = self.context.hub.register(&self.client_id, connection) {
            tracing::debug!(client_id = %self.client_id, "Rejecting connection during shutdown");
            let _ = writer.send(Message::Close(None)).await;
            return;
        }
        self.transition(LifecycleEvent::Registered);

        let welcome = self.context.welcome_for(&self.client_id);
        self.context.broadcaster.unicast(&self.client_id, &welcome);

        let (event_tx, mut event_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let reader_task = tokio::spawn(async move {
            while let Some(result) = reader.next().await {
                let event = match result {
                    Ok(Message::Text(text)) => SessionEvent::Inbound {
                        text: text.to_string(),
                        received_at: Utc::now(),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "Client socket read failed");
                        break;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = event_tx.send(SessionEvent::TransportClosed).await;
        });

        loop {
            let event = tokio::select! {
                biased;

                () = cancel.cancelled() => SessionEvent::Shutdown,

                // The session holds a sender, so the queue outlives a superseding
                // reconnect and still carries this socket's own replies
                Some(frame) = frame_rx.recv() => {
                    if let Err(e) = writer.send(Message::Text(frame.to_string().into())).await {
                        tracing::debug!(client_id = %self.client_id, error = %e, "Client socket write failed");
                        SessionEvent::TransportClosed
                    } else {
                        continue;
                    }
                }

                event = event_rx.recv() => event.unwrap_or(SessionEvent::TransportClosed),
            };

            if let SessionEvent::Inbound { text, received_at } = &event {
                let origin = Origin {
                    client_id: &self.client_id,
                    connection_id: self.connection_id,
                    reply_to: transport.as_ref(),
                };
                self.context.router.handle(&origin, text, *received_at);
                continue;
            }

            if let Some(lifecycle) = event.lifecycle() {
                self.transition(lifecycle);
            }
            if event == SessionEvent::Shutdown {
                let _ = writer.send(Message::Close(None)).await;
            }
            break;
        }

        reader_task.abort();
        let removed = self
            .context
            .hub
            .disconnect(&self.client_id, self.connection_id);

        tracing::debug!(
            client_id = %self.client_id,
            connection_id = self.connection_id,
            removed,
            state = self.state.as_str(),
            "Session ended"
        );
    }

    fn transition(&mut self, event: LifecycleEvent) {
        match self.state.apply(event) {
            Ok(next) => self.state = next,
            Err(e) => tracing::warn!(
                client_id = %self.client_id,
                connection_id = self.connection_id,
                error = %e,
                "Rejected connection state transition"
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
