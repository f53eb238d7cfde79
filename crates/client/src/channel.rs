// ============================
// crates/client/src/channel.rs
// ============================
//! Reconnecting WebSocket channel.
//!
//! Owns one transport session at a time. On loss it retries with
//! exponential backoff (base delay x 1.5 per attempt) up to a capped number
//! of attempts, then surfaces `Disconnected` instead of retrying forever.
//! Consumers observe the state through a watch channel and must resync full
//! state (the participants snapshot route) after every reopen: broadcasts
//! missed while down are not replayed.

use futures_util::{SinkExt, StreamExt};
use rendezvous_common::{ClientToServer, ServerToClient};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

/// Transport-level connection state, one of the three independent UI
/// signals (the others live on the scheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint, e.g. `ws://host:3000/ws`
    pub url: String,
    /// Handshake auth token; the server closes tokenless connections
    pub token: String,
    /// Event room to bind at handshake time
    pub event_id: Option<String>,
    pub max_reconnect_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            event_id: None,
            max_reconnect_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff_factor: 1.5,
        }
    }

    pub fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    fn connect_url(&self) -> String {
        match &self.event_id {
            Some(event_id) => format!("{}?token={}&event_id={}", self.url, self.token, event_id),
            None => format!("{}?token={}", self.url, self.token),
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(self.backoff_factor.powi(attempt.saturating_sub(1) as i32))
    }
}

/// Handle to a running channel. Dropping the handle does not stop the
/// background task; call [`EventChannel::close`].
pub struct EventChannel {
    state_rx: watch::Receiver<ChannelState>,
    outbound_tx: mpsc::Sender<ClientToServer>,
    inbound_tx: broadcast::Sender<ServerToClient>,
    task: JoinHandle<()>,
}

impl EventChannel {
    /// Spawn the connection loop.
    pub fn connect(config: ChannelConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(32);
        let (inbound_tx, _) = broadcast::channel(256);
        let task = tokio::spawn(run_channel(config, state_tx, outbound_rx, inbound_tx.clone()));
        Self {
            state_rx,
            outbound_tx,
            inbound_tx,
            task,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state_rx.borrow().clone()
    }

    /// Observe state transitions (open, reconnecting, disconnected).
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Subscribe to inbound broadcasts. Lagging receivers skip messages,
    /// which is fine: broadcasts are hints, the snapshot route is truth.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerToClient> {
        self.inbound_tx.subscribe()
    }

    /// Queue an outbound message. Returns false once the channel is gone.
    pub async fn send(&self, msg: ClientToServer) -> bool {
        self.outbound_tx.send(msg).await.is_ok()
    }

    /// Sender half for components that emit on their own cadence.
    pub fn sender(&self) -> mpsc::Sender<ClientToServer> {
        self.outbound_tx.clone()
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

async fn run_channel(
    config: ChannelConfig,
    state_tx: watch::Sender<ChannelState>,
    mut outbound_rx: mpsc::Receiver<ClientToServer>,
    inbound_tx: broadcast::Sender<ServerToClient>,
) {
    let mut attempt: u32 = 0;

    loop {
        let _ = state_tx.send(if attempt == 0 {
            ChannelState::Connecting
        } else {
            ChannelState::Reconnecting { attempt }
        });

        match connect_async(config.connect_url()).await {
            Ok((ws, _)) => {
                attempt = 0;
                let _ = state_tx.send(ChannelState::Open);
                let (mut sink, mut stream) = ws.split();

                loop {
                    tokio::select! {
                        outgoing = outbound_rx.recv() => match outgoing {
                            Some(msg) => {
                                let json = match serde_json::to_string(&msg) {
                                    Ok(json) => json,
                                    Err(err) => {
                                        warn!(%err, "dropping unserializable outbound message");
                                        continue;
                                    }
                                };
                                if sink.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            // All senders dropped: orderly shutdown.
                            None => {
                                let _ = sink.send(Message::Close(None)).await;
                                let _ = state_tx.send(ChannelState::Disconnected);
                                return;
                            }
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerToClient>(&text) {
                                    Ok(msg) => { let _ = inbound_tx.send(msg); }
                                    Err(err) => debug!(%err, "unparseable server frame"),
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!(?frame, "server closed the channel");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                debug!(%err, "transport error");
                                break;
                            }
                            None => break,
                        },
                    }
                }
            }
            Err(err) => {
                debug!(%err, attempt, "connect failed");
            }
        }

        attempt += 1;
        if attempt > config.max_reconnect_attempts {
            warn!("reconnect attempts exhausted");
            let _ = state_tx.send(ChannelState::Disconnected);
            return;
        }
        tokio::time::sleep(config.reconnect_delay(attempt)).await;
    }
}
