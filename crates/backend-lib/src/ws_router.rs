// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
//!
//! Channel lifecycle: Connecting -> Authenticating -> Open -> Closed. The
//! token travels in the handshake query, so a connection without one is
//! closed (4001) before it ever reaches Open; an invalid or expired token
//! closes with 4003. Once open, a malformed or failing message gets an
//! `error` reply on the same socket, never a close, and `unregister` runs
//! unconditionally when the transport drops.

use crate::auth::Claims;
use crate::error::AppError;
use crate::registry::Connection;
use crate::storage::Storage;
use crate::AppState;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use rendezvous_common::protocol::ParticipantInfo;
use rendezvous_common::{ClientToServer, RejectReason, ServerToClient};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub event_id: Option<String>,
}

/// Build the realtime router: the channel endpoint plus the full-state
/// snapshot route clients hit to resync after a reconnect.
pub fn create_router<S: Storage + Clone + Send + Sync + 'static>(
    state: Arc<AppState<S>>,
) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<S>))
        .route(
            "/events/{event_id}/participants",
            get(participants_handler::<S>),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_handler<S: Storage + Clone + Send + Sync + 'static>(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    // Authenticate at handshake time; the socket still upgrades so the
    // rejection can reach the client as a distinguishable close code.
    let auth = state.verifier.verify(query.token.as_deref());
    ws.on_upgrade(move |socket| handle_connection(socket, state, auth, query.event_id))
}

async fn handle_connection<S: Storage + Clone + Send + Sync + 'static>(
    socket: WebSocket,
    state: Arc<AppState<S>>,
    auth: Result<Claims, RejectReason>,
    event_id: Option<String>,
) {
    let (mut sink, mut stream) = socket.split();

    let claims = match auth {
        Ok(claims) => claims,
        Err(reason) => {
            counter!("ws.rejected").increment(1);
            debug!(reason = reason.as_str(), "handshake rejected");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: reason.close_code(),
                    reason: reason.as_str().into(),
                })))
                .await;
            return;
        }
    };

    counter!("ws.connections").increment(1);
    gauge!("ws.active").increment(1.0);

    let (tx, mut rx) = mpsc::channel::<ServerToClient>(32);
    let mut conn = Connection {
        socket_id: Uuid::new_v4(),
        user_id: claims.sub.clone(),
        event_id,
        tx,
    };
    state.registry.register(conn.clone());
    info!(user_id = %conn.user_id, socket_id = %conn.socket_id, "channel open");

    // Forward outbound messages (replies and room broadcasts) to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    warn!(%err, "dropping unserializable message");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientToServer>(&text) {
                Ok(msg) => {
                    if let Err(err) = handle_client_message(&state, &mut conn, msg).await {
                        warn!(user_id = %conn.user_id, %err, "message handling failed");
                        let reply = ServerToClient::Error {
                            code: err.error_code().to_string(),
                            message: err.to_string(),
                        };
                        if conn.tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Err(err) => {
                    // A single bad message must not terminate the session.
                    let reply = ServerToClient::Error {
                        code: "malformed_message".to_string(),
                        message: err.to_string(),
                    };
                    if conn.tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup runs on every exit path so no stale registry entries survive
    // an abnormal close.
    state
        .registry
        .unregister(conn.socket_id, &conn.user_id, conn.event_id.as_deref());
    info!(user_id = %conn.user_id, socket_id = %conn.socket_id, "channel closed");
    counter!("ws.disconnections").increment(1);
    gauge!("ws.active").decrement(1.0);
    send_task.abort();
}

async fn handle_client_message<S: Storage + Clone + Send + Sync + 'static>(
    state: &Arc<AppState<S>>,
    conn: &mut Connection,
    msg: ClientToServer,
) -> Result<(), AppError> {
    match msg {
        ClientToServer::LocationUpdate { event_id, lat, lng } => {
            state.pipeline.apply(&event_id, &conn.user_id, lat, lng).await?;
            Ok(())
        }
        ClientToServer::ParticipantJoined { event_id } => {
            let participant = state.storage.join_event(&event_id, &conn.user_id).await?;
            if conn.event_id.as_deref() != Some(event_id.as_str()) {
                state.registry.bind_event(conn, &event_id);
                conn.event_id = Some(event_id.clone());
            }
            let user = state.storage.get_user(&conn.user_id).await?;
            state
                .registry
                .broadcast(
                    &event_id,
                    ServerToClient::ParticipantJoined {
                        event_id: event_id.clone(),
                        participant: ParticipantInfo {
                            id: participant.id,
                            user,
                        },
                    },
                    Some(&conn.user_id),
                )
                .await;
            Ok(())
        }
        ClientToServer::ParticipantLeft { event_id } => {
            state.storage.leave_event(&event_id, &conn.user_id).await?;
            state.pipeline.forget(&event_id, &conn.user_id);
            state
                .registry
                .broadcast(
                    &event_id,
                    ServerToClient::ParticipantLeft {
                        event_id: event_id.clone(),
                        participant_id: conn.user_id.clone(),
                    },
                    Some(&conn.user_id),
                )
                .await;
            Ok(())
        }
        ClientToServer::Ping => conn
            .tx
            .send(ServerToClient::Pong {
                timestamp: Utc::now(),
            })
            .await
            .map_err(|_| AppError::Internal("reply channel closed".to_string())),
    }
}

/// Full-state snapshot for one event. Broadcasts are hints; clients call
/// this after (re)connecting to get the canonical roster.
async fn participants_handler<S: Storage + Clone + Send + Sync + 'static>(
    Path(event_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState<S>>>,
) -> Result<impl IntoResponse, AppError> {
    let claims = state
        .verifier
        .verify(query.token.as_deref())
        .map_err(|reason| AppError::Auth(reason.as_str().to_string()))?;

    let (event, participants) = state
        .storage
        .get_event_with_participants(&event_id, &claims.sub)
        .await?;

    Ok(Json(serde_json::json!({
        "event": event,
        "participants": participants,
    })))
}
