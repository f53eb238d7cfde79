// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! In-memory connection registry.
//!
//! Bidirectional index of live sockets: user id to connections, event id to
//! the connections subscribed to that event's room. The registry is an
//! injected instance owned by `AppState`, not a module-level singleton, so
//! tests can run isolated instances. It is process-local by design;
//! cross-process fan-out would need an external pub/sub layer.

use dashmap::DashMap;
use metrics::counter;
use rendezvous_common::ServerToClient;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

/// One live transport session. Multiple connections may map to the same
/// user (multi-tab, multi-device). Never serialized.
#[derive(Clone)]
pub struct Connection {
    pub socket_id: Uuid,
    pub user_id: String,
    pub event_id: Option<String>,
    pub tx: mpsc::Sender<ServerToClient>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    by_user: DashMap<String, Vec<Connection>>,
    by_event: DashMap<String, Vec<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a freshly authenticated connection; binds the event room when
    /// the handshake carried an event id.
    pub fn register(&self, conn: Connection) {
        if let Some(event_id) = conn.event_id.clone() {
            self.by_event.entry(event_id).or_default().push(conn.clone());
        }
        self.by_user
            .entry(conn.user_id.clone())
            .or_default()
            .push(conn);
    }

    /// Drop a connection from both indexes. Runs unconditionally on close,
    /// abnormal or not; empty per-key vectors are pruned so connect and
    /// disconnect churn does not grow memory.
    pub fn unregister(&self, socket_id: Uuid, user_id: &str, event_id: Option<&str>) {
        if let Some(mut conns) = self.by_user.get_mut(user_id) {
            conns.retain(|c| c.socket_id != socket_id);
        }
        self.by_user.remove_if(user_id, |_, conns| conns.is_empty());

        if let Some(event_id) = event_id {
            if let Some(mut conns) = self.by_event.get_mut(event_id) {
                conns.retain(|c| c.socket_id != socket_id);
            }
            self.by_event.remove_if(event_id, |_, conns| conns.is_empty());
        }
    }

    /// Late room binding for a connection that joined an event after the
    /// handshake. Moves the socket out of its previous room, if any.
    pub fn bind_event(&self, conn: &Connection, event_id: &str) {
        if let Some(old) = conn.event_id.as_deref() {
            if old == event_id {
                return;
            }
            if let Some(mut conns) = self.by_event.get_mut(old) {
                conns.retain(|c| c.socket_id != conn.socket_id);
            }
            self.by_event.remove_if(old, |_, conns| conns.is_empty());
        }

        let mut room = self.by_event.entry(event_id.to_string()).or_default();
        if room.iter().all(|c| c.socket_id != conn.socket_id) {
            let mut conn = conn.clone();
            conn.event_id = Some(event_id.to_string());
            room.push(conn);
        }
    }

    /// Fan a message out to every connection in the event's room, skipping
    /// `exclude_user_id`. Best-effort and unordered: sends run concurrently,
    /// failures are counted but not retried, and an empty room is a no-op.
    /// Returns the number of deliveries that succeeded.
    pub async fn broadcast(
        &self,
        event_id: &str,
        msg: ServerToClient,
        exclude_user_id: Option<&str>,
    ) -> usize {
        let targets: Vec<mpsc::Sender<ServerToClient>> = match self.by_event.get(event_id) {
            Some(conns) => conns
                .iter()
                .filter(|c| exclude_user_id.is_none_or(|u| c.user_id != u))
                .map(|c| c.tx.clone())
                .collect(),
            None => return 0,
        };

        let mut sends = JoinSet::new();
        for tx in targets {
            let msg = msg.clone();
            sends.spawn(async move { tx.send(msg).await.is_ok() });
        }

        let mut delivered = 0;
        while let Some(result) = sends.join_next().await {
            match result {
                Ok(true) => delivered += 1,
                Ok(false) | Err(_) => {
                    counter!("broadcast.failed").increment(1);
                }
            }
        }
        counter!("broadcast.delivered").increment(delivered as u64);
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.by_user.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn room_size(&self, event_id: &str) -> usize {
        self.by_event
            .get(event_id)
            .map_or(0, |conns| conns.len())
    }

    pub fn user_entry_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn event_entry_count(&self) -> usize {
        self.by_event.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(user: &str, event: Option<&str>) -> (Connection, mpsc::Receiver<ServerToClient>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Connection {
                socket_id: Uuid::new_v4(),
                user_id: user.to_string(),
                event_id: event.map(str::to_string),
                tx,
            },
            rx,
        )
    }

    fn deleted(event: &str) -> ServerToClient {
        ServerToClient::EventDeleted {
            event_id: event.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_unregister_prunes_both_maps() {
        let registry = ConnectionRegistry::new();
        let (c, _rx) = conn("alice", Some("evt-1"));
        registry.register(c.clone());

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.room_size("evt-1"), 1);

        registry.unregister(c.socket_id, &c.user_id, c.event_id.as_deref());
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.user_entry_count(), 0);
        assert_eq!(registry.event_entry_count(), 0);
    }

    #[tokio::test]
    async fn churn_does_not_grow_the_maps() {
        let registry = ConnectionRegistry::new();
        for _ in 0..100 {
            let (c, _rx) = conn("alice", Some("evt-1"));
            registry.register(c.clone());
            registry.unregister(c.socket_id, &c.user_id, c.event_id.as_deref());
        }
        assert_eq!(registry.user_entry_count(), 0);
        assert_eq!(registry.event_entry_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_skips_the_excluded_user() {
        let registry = ConnectionRegistry::new();
        let (a, mut a_rx) = conn("alice", Some("evt-1"));
        let (b, mut b_rx) = conn("bob", Some("evt-1"));
        registry.register(a);
        registry.register(b);

        let delivered = registry
            .broadcast("evt-1", deleted("evt-1"), Some("alice"))
            .await;
        assert_eq!(delivered, 1);
        assert!(b_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_unknown_event_is_a_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.broadcast("ghost", deleted("ghost"), None).await, 0);
    }

    #[tokio::test]
    async fn multiple_sockets_per_user_all_receive() {
        let registry = ConnectionRegistry::new();
        let (tab1, mut rx1) = conn("alice", Some("evt-1"));
        let (tab2, mut rx2) = conn("alice", Some("evt-1"));
        registry.register(tab1);
        registry.register(tab2);

        let delivered = registry.broadcast("evt-1", deleted("evt-1"), None).await;
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn bind_event_moves_the_socket_between_rooms() {
        let registry = ConnectionRegistry::new();
        let (c, _rx) = conn("alice", None);
        registry.register(c.clone());
        assert_eq!(registry.room_size("evt-1"), 0);

        registry.bind_event(&c, "evt-1");
        assert_eq!(registry.room_size("evt-1"), 1);

        // Binding again is idempotent.
        registry.bind_event(&c, "evt-1");
        assert_eq!(registry.room_size("evt-1"), 1);

        let mut bound = c.clone();
        bound.event_id = Some("evt-1".to_string());
        registry.bind_event(&bound, "evt-2");
        assert_eq!(registry.room_size("evt-1"), 0);
        assert_eq!(registry.event_entry_count(), 1);
        assert_eq!(registry.room_size("evt-2"), 1);
    }
}
