// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Server side of the rendezvous live-location coordination engine.
//!
//! Ingests periodic position reports over authenticated WebSocket channels,
//! derives movement, distance and ETA, and fans updates out to every socket
//! subscribed to the same event. The registry is process-local: broadcasts
//! only reach sockets attached to this process.

pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod ws_router;

use crate::auth::TokenVerifier;
use crate::config::Settings;
use crate::pipeline::LocationPipeline;
use crate::registry::ConnectionRegistry;
use crate::storage::Storage;
use rendezvous_common::ServerToClient;
use rendezvous_directions::DirectionsProvider;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState<S> {
    /// Storage collaborator
    pub storage: S,
    /// Live connection index, injected so tests run isolated instances
    pub registry: Arc<ConnectionRegistry>,
    /// Handshake token verification
    pub verifier: Arc<TokenVerifier>,
    /// The location update pipeline
    pub pipeline: Arc<LocationPipeline<S>>,
    /// Settings
    pub settings: Arc<Settings>,
}

impl<S: Storage + Clone + Send + Sync + 'static> AppState<S> {
    pub fn new(storage: S, directions: Arc<dyn DirectionsProvider>, settings: Settings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let verifier = Arc::new(TokenVerifier::new(&settings.jwt_secret));
        let pipeline = Arc::new(LocationPipeline::new(
            storage.clone(),
            directions,
            registry.clone(),
        ));
        Self {
            storage,
            registry,
            verifier,
            pipeline,
            settings: Arc::new(settings),
        }
    }

    /// Notify an event's room that the event was deleted. Called by the
    /// external CRUD layer when it tears an event down; returns how many
    /// sockets were reached.
    pub async fn notify_event_deleted(&self, event_id: &str) -> usize {
        self.registry
            .broadcast(
                event_id,
                ServerToClient::EventDeleted {
                    event_id: event_id.to_string(),
                },
                None,
            )
            .await
    }
}
