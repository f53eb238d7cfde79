// ============================
// crates/backend-lib/tests/ws_flow.rs
// ============================
//! End-to-end WebSocket flow tests against a real listener.

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::{SinkExt, StreamExt};
use rendezvous_backend_lib::auth::issue_token;
use rendezvous_backend_lib::config::Settings;
use rendezvous_backend_lib::storage::{MemoryStorage, Storage};
use rendezvous_backend_lib::{ws_router, AppState};
use rendezvous_common::{Coordinates, EventContext, UserSummary};
use rendezvous_directions::StaticDirections;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "ws-flow-secret";

async fn spawn_server() -> (SocketAddr, Arc<AppState<MemoryStorage>>) {
    let storage = MemoryStorage::new();
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        storage.put_user(UserSummary {
            id: id.into(),
            name: name.into(),
        });
    }
    storage.put_event(EventContext {
        id: "evt-1".into(),
        location_name: "Cafe".into(),
        location: Some(Coordinates::new(48.85, 2.35)),
        starts_at: Utc::now() + ChronoDuration::hours(2),
        allow_location_sharing: true,
        creator_id: "alice".into(),
    });
    storage.join_event("evt-1", "alice").await.unwrap();
    storage.join_event("evt-1", "bob").await.unwrap();

    let settings = Settings {
        jwt_secret: SECRET.to_string(),
        ..Settings::default()
    };
    let state = Arc::new(AppState::new(
        storage,
        Arc::new(StaticDirections::with_duration_minutes(20)),
        settings,
    ));

    let app = ws_router::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr, query: &str) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}/ws?{query}"))
        .await
        .expect("handshake");
    ws
}

async fn connect_as(addr: SocketAddr, user: &str, name: &str) -> WsClient {
    let token = issue_token(SECRET, user, name, ChronoDuration::hours(1)).unwrap();
    connect(addr, &format!("token={token}&event_id=evt-1")).await
}

/// Registration happens after the upgrade completes; wait for it so a test
/// does not broadcast into a not-yet-populated room.
async fn wait_for_room(state: &Arc<AppState<MemoryStorage>>, size: usize) {
    timeout(Duration::from_secs(5), async {
        while state.registry.room_size("evt-1") < size {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room never reached expected size");
}

/// Next text frame as JSON, with a deadline so a missing broadcast fails
/// fast instead of hanging the suite.
async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_token_closes_with_4001() {
    let (addr, _state) = spawn_server().await;
    let mut ws = connect(addr, "event_id=evt-1").await;

    match ws.next().await {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 4001);
            assert_eq!(frame.reason.as_str(), "token_required");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_token_closes_with_4003() {
    let (addr, _state) = spawn_server().await;
    let mut ws = connect(addr, "token=garbage&event_id=evt-1").await;

    match ws.next().await {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 4003);
            assert_eq!(frame.reason.as_str(), "token_invalid");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn location_update_broadcasts_to_the_room_but_not_the_sender() {
    let (addr, state) = spawn_server().await;
    let mut alice = connect_as(addr, "alice", "Alice").await;
    let mut bob = connect_as(addr, "bob", "Bob").await;
    wait_for_room(&state, 2).await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "location_update",
            "event_id": "evt-1",
            "lat": 48.80,
            "lng": 2.30,
        }),
    )
    .await;

    // Bob, not Alice, receives exactly one eta_updated for Alice.
    let broadcast = next_json(&mut bob).await;
    assert_eq!(broadcast["type"], "eta_updated");
    assert_eq!(broadcast["event_id"], "evt-1");
    assert_eq!(broadcast["participant_id"], "alice");
    assert_eq!(broadcast["eta"], 20.0);
    assert_eq!(broadcast["is_moving"], false);

    // If the broadcast had leaked back to Alice it would be queued ahead of
    // the pong she gets for this ping.
    send_json(&mut alice, serde_json::json!({"type": "ping"})).await;
    let reply = next_json(&mut alice).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn malformed_message_gets_an_error_reply_and_keeps_the_session() {
    let (addr, _state) = spawn_server().await;
    let mut alice = connect_as(addr, "alice", "Alice").await;

    alice
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();
    let reply = next_json(&mut alice).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "malformed_message");

    // Session survives the bad frame.
    send_json(&mut alice, serde_json::json!({"type": "ping"})).await;
    let reply = next_json(&mut alice).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn failing_update_replies_with_error_not_close() {
    let (addr, _state) = spawn_server().await;
    let mut alice = connect_as(addr, "alice", "Alice").await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "location_update",
            "event_id": "no-such-event",
            "lat": 48.80,
            "lng": 2.30,
        }),
    )
    .await;
    let reply = next_json(&mut alice).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "event_not_found");

    send_json(&mut alice, serde_json::json!({"type": "ping"})).await;
    let reply = next_json(&mut alice).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn join_and_leave_broadcasts_reach_the_room() {
    let (addr, state) = spawn_server().await;
    let mut alice = connect_as(addr, "alice", "Alice").await;
    let mut bob = connect_as(addr, "bob", "Bob").await;
    wait_for_room(&state, 2).await;

    send_json(
        &mut bob,
        serde_json::json!({"type": "participant_joined", "event_id": "evt-1"}),
    )
    .await;
    let broadcast = next_json(&mut alice).await;
    assert_eq!(broadcast["type"], "participant_joined");
    assert_eq!(broadcast["participant"]["user"]["id"], "bob");

    send_json(
        &mut bob,
        serde_json::json!({"type": "participant_left", "event_id": "evt-1"}),
    )
    .await;
    let broadcast = next_json(&mut alice).await;
    assert_eq!(broadcast["type"], "participant_left");
    assert_eq!(broadcast["participant_id"], "bob");

    // The roster reflects the leave.
    let (_, roster) = state
        .storage
        .get_event_with_participants("evt-1", "alice")
        .await
        .unwrap();
    assert!(roster.iter().all(|p| p.user_id != "bob"));
}

#[tokio::test]
async fn disconnect_unregisters_the_socket() {
    let (addr, state) = spawn_server().await;
    let alice = connect_as(addr, "alice", "Alice").await;
    // Wait for registration to land before dropping the transport.
    timeout(Duration::from_secs(5), async {
        while state.registry.room_size("evt-1") == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    drop(alice);

    timeout(Duration::from_secs(5), async {
        while state.registry.room_size("evt-1") > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry entry should be pruned after disconnect");
    assert_eq!(state.registry.connection_count(), 0);
}
