//! WebSocket Server Integration Tests
//!
//! Starts the real client server on an ephemeral port and talks to it with
//! a tokio-tungstenite client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use sports_stream_hub::application::ports::EventSink;
use sports_stream_hub::infrastructure::config::WelcomeSettings;
use sports_stream_hub::infrastructure::websocket::{SessionContext, serve};
use sports_stream_hub::{
    Broadcaster, GameStatus, GameUpdate, Hub, InjuryImpact, InjuryUpdate, Score, SportsEvent,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    hub: Arc<Hub>,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let hub = Arc::new(Hub::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&hub)));
        let context = Arc::new(SessionContext::new(
            Arc::clone(&broadcaster),
            WelcomeSettings::default(),
            64,
        ));
        let cancel = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            serve(listener, context, server_cancel).await.unwrap();
        });

        Self {
            addr,
            hub,
            broadcaster,
            cancel,
            handle,
        }
    }

    async fn connect(&self, query: &str) -> Client {
        let url = format!("ws://{}/ws{query}", self.addr);
        let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        client
    }

    async fn wait_for_connections(&self, expected: usize) {
        timeout(RECV_TIMEOUT, async {
            while self.hub.connection_count() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count never reached expected value");
    }
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(client: &mut Client, value: &Value) {
    client
        .send(Message::text(value.to_string()))
        .await
        .unwrap();
}

/// PING/PONG round trip. Commands are handled in order, so everything sent
/// before the ping has been applied once the pong arrives.
async fn sync(client: &mut Client) {
    send_json(client, &json!({ "type": "PING" })).await;
    let pong = next_json(client).await;
    assert_eq!(pong["type"], "PONG");
}

fn game_update(game_id: &str) -> SportsEvent {
    SportsEvent::game(GameUpdate {
        game_id: game_id.to_string(),
        score: Score { home: 21, away: 17 },
        status: GameStatus::InProgress,
        time: "Q4 02:00".to_string(),
        key_plays: Vec::new(),
        player_updates: BTreeMap::new(),
    })
}

#[tokio::test]
async fn welcome_is_first_frame() {
    let server = TestServer::start().await;
    let mut client = server.connect("?userId=alice").await;

    let welcome = next_json(&mut client).await;

    assert_eq!(welcome["type"], "WELCOME");
    assert_eq!(welcome["userId"], "alice");
    assert_eq!(welcome["message"], "Connected to live sports updates");
    assert!(
        welcome["features"]
            .as_array()
            .unwrap()
            .contains(&json!("live_scores"))
    );
    assert!(welcome["timestamp"].is_string());
}

#[tokio::test]
async fn missing_user_id_is_anonymous() {
    let server = TestServer::start().await;
    let mut client = server.connect("").await;

    let welcome = next_json(&mut client).await;

    assert_eq!(welcome["userId"], "anonymous");
    assert!(server.hub.is_connected("anonymous"));
}

#[tokio::test]
async fn ping_answered_with_pong() {
    let server = TestServer::start().await;
    let mut client = server.connect("?userId=alice").await;
    next_json(&mut client).await;

    send_json(&mut client, &json!({ "type": "PING" })).await;
    let pong = next_json(&mut client).await;

    assert_eq!(pong["type"], "PONG");
    assert!(pong["timestamp"].is_string());
}

#[tokio::test]
async fn game_updates_are_filtered_by_subscription() {
    let server = TestServer::start().await;
    let mut alice = server.connect("?userId=alice").await;
    let mut bob = server.connect("?userId=bob").await;
    next_json(&mut alice).await;
    next_json(&mut bob).await;

    send_json(&mut alice, &json!({ "type": "SUBSCRIBE_GAMES", "gameIds": ["G1"] })).await;
    send_json(&mut bob, &json!({ "type": "SUBSCRIBE_GAMES", "gameIds": ["G2"] })).await;
    sync(&mut alice).await;
    sync(&mut bob).await;

    server.broadcaster.publish(&game_update("G1"));
    server.broadcaster.publish(&game_update("G2"));

    let alice_update = next_json(&mut alice).await;
    assert_eq!(alice_update["type"], "GAME_UPDATE");
    assert_eq!(alice_update["gameId"], "G1");
    assert_eq!(alice_update["data"]["score"]["home"], 21);

    let bob_update = next_json(&mut bob).await;
    assert_eq!(bob_update["gameId"], "G2");
}

#[tokio::test]
async fn injury_updates_reach_everyone() {
    let server = TestServer::start().await;
    let mut alice = server.connect("?userId=alice").await;
    let mut bob = server.connect("?userId=bob").await;
    next_json(&mut alice).await;
    next_json(&mut bob).await;
    server.wait_for_connections(2).await;

    let report = server.broadcaster.publish(&SportsEvent::injury(InjuryUpdate {
        player: "P12".to_string(),
        team: "Hawks".to_string(),
        injury: "Hamstring".to_string(),
        status: "OUT".to_string(),
        impact: InjuryImpact::High,
    }));
    assert_eq!(report.delivered, 2);

    for client in [&mut alice, &mut bob] {
        let update = next_json(client).await;
        assert_eq!(update["type"], "INJURY_UPDATE");
        assert_eq!(update["data"]["impact"], "HIGH");
    }
}

#[tokio::test]
async fn malformed_frames_keep_connection_open() {
    let server = TestServer::start().await;
    let mut client = server.connect("?userId=alice").await;
    next_json(&mut client).await;

    client.send(Message::text("{not json")).await.unwrap();
    send_json(&mut client, &json!({ "type": "SUBSCRIBE_TEAMS", "teamIds": ["T1"] })).await;
    sync(&mut client).await;

    assert!(server.hub.is_connected("alice"));
}

#[tokio::test]
async fn disconnect_removes_client_from_stats() {
    let server = TestServer::start().await;
    let mut alice = server.connect("?userId=alice").await;
    let mut bob = server.connect("?userId=bob").await;
    next_json(&mut alice).await;
    next_json(&mut bob).await;
    send_json(&mut alice, &json!({ "type": "SUBSCRIBE_GAMES", "gameIds": ["G1"] })).await;
    sync(&mut alice).await;

    alice.close(None).await.unwrap();
    server.wait_for_connections(1).await;

    let stats = server.hub.stats();
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.active_users, vec!["bob".to_string()]);
    assert_eq!(stats.total_subscriptions, 0);
}

#[tokio::test]
async fn reconnecting_client_supersedes_previous_session() {
    let server = TestServer::start().await;
    let mut first = server.connect("?userId=alice").await;
    next_json(&mut first).await;
    let mut second = server.connect("?userId=alice").await;
    next_json(&mut second).await;

    assert_eq!(server.hub.connection_count(), 1);

    first.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Only the newest session is registered, and the old one leaving does
    // not remove it
    assert!(server.hub.is_connected("alice"));
    sync(&mut second).await;
}

#[tokio::test]
async fn superseded_session_cannot_act_for_its_successor() {
    let server = TestServer::start().await;
    let mut first = server.connect("?userId=alice").await;
    next_json(&mut first).await;
    let mut second = server.connect("?userId=alice").await;
    next_json(&mut second).await;
    server.wait_for_connections(1).await;

    // The old socket is still open and still talking
    send_json(&mut first, &json!({ "type": "SUBSCRIBE_GAMES", "gameIds": ["G9"] })).await;
    sync(&mut first).await;
    assert!(server.hub.subscriptions("alice").is_empty());

    send_json(&mut second, &json!({ "type": "SUBSCRIBE_GAMES", "gameIds": ["G1"] })).await;
    sync(&mut second).await;

    let games = server.hub.subscriptions("alice").games;
    assert_eq!(games.len(), 1);
    assert!(games.contains("G1"));

    // A stray pong for the old socket would arrive ahead of this update
    server.broadcaster.publish(&game_update("G9"));
    server.broadcaster.publish(&game_update("G1"));
    let update = next_json(&mut second).await;
    assert_eq!(update["type"], "GAME_UPDATE");
    assert_eq!(update["gameId"], "G1");
}

#[tokio::test]
async fn shutdown_closes_client_sockets() {
    let server = TestServer::start().await;
    let mut client = server.connect("?userId=alice").await;
    next_json(&mut client).await;

    server.cancel.cancel();

    let closed = timeout(RECV_TIMEOUT, async {
        while let Some(message) = client.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => return,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "client socket was not closed on shutdown");

    server.wait_for_connections(0).await;
    timeout(RECV_TIMEOUT, server.handle).await.unwrap().unwrap();
}
