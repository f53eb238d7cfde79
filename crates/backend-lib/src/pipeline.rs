// ============================
// crates/backend-lib/src/pipeline.rs
// ============================
//! Location update pipeline.
//!
//! The core algorithm: a raw (lat, lng) sample from an authenticated
//! participant is turned into movement state, distance, and an ETA, the
//! participant row is persisted, and an `eta_updated` broadcast goes to the
//! event room excluding the sender.
//!
//! Failure policy: a gateway failure degrades to an unknown ETA and the
//! update still lands; a storage failure aborts this sample without a
//! broadcast and without touching the channel. The next periodic sample
//! retries independently.

use crate::error::AppError;
use crate::registry::ConnectionRegistry;
use crate::storage::Storage;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use metrics::counter;
use rendezvous_common::geo::{self, Coordinates, MOVEMENT_THRESHOLD_KM};
use rendezvous_common::{Participant, ServerToClient};
use rendezvous_directions::{DirectionsProvider, TravelMode};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// A prior position older than this cannot witness movement: the device was
/// likely offline in between.
const MOVEMENT_WINDOW_SECS: i64 = 30;

pub struct LocationPipeline<S> {
    storage: S,
    directions: Arc<dyn DirectionsProvider>,
    registry: Arc<ConnectionRegistry>,
    /// Per-(event, user) sequencing so duplicate rapid samples cannot race
    /// their own read-modify-write.
    in_flight: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl<S: Storage + Clone + Send + Sync + 'static> LocationPipeline<S> {
    pub fn new(
        storage: S,
        directions: Arc<dyn DirectionsProvider>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            storage,
            directions,
            registry,
            in_flight: DashMap::new(),
        }
    }

    /// Run one sample through the pipeline and return the persisted row.
    pub async fn apply(
        &self,
        event_id: &str,
        user_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<Participant, AppError> {
        let sample = Coordinates::new(lat, lng);
        if !sample.in_range() {
            return Err(AppError::InvalidCoordinates { lat, lng });
        }

        let lock = self
            .in_flight
            .entry((event_id.to_string(), user_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let (event, roster) = self
            .storage
            .get_event_with_participants(event_id, user_id)
            .await?;
        if !event.allow_location_sharing {
            return Err(AppError::LocationSharingDisabled(event_id.to_string()));
        }
        let prior = roster
            .into_iter()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::ParticipantNotFound(event_id.to_string()))?;

        let now = Utc::now();
        let distance_km = event
            .location
            .map(|dest| geo::distance_km(lat, lng, dest.lat, dest.lng));

        // First-ever report has nothing to compare against.
        let is_moving = match (prior.last_position(), prior.last_location_at) {
            (Some(old), Some(at)) => {
                geo::distance_km(old.lat, old.lng, lat, lng) > MOVEMENT_THRESHOLD_KM
                    && now.signed_duration_since(at) < Duration::seconds(MOVEMENT_WINDOW_SECS)
            }
            _ => false,
        };

        // A gateway failure is not an error: the update proceeds with the
        // ETA marked unknown (0).
        let eta_minutes = match event.location {
            Some(dest) => match self
                .directions
                .directions(sample, dest, TravelMode::Driving)
                .await
            {
                Some(route) => route.duration_minutes(),
                None => {
                    counter!("directions.failures").increment(1);
                    debug!(event_id, user_id, "directions unavailable, eta unknown");
                    0.0
                }
            },
            None => 0.0,
        };

        let updated = self
            .storage
            .update_participant_location(
                event_id, user_id, lat, lng, is_moving, eta_minutes, distance_km,
            )
            .await?;

        let broadcast = ServerToClient::EtaUpdated {
            event_id: event_id.to_string(),
            participant_id: user_id.to_string(),
            eta: eta_minutes,
            distance: distance_km.unwrap_or(0.0),
            is_moving,
            timestamp: now,
        };
        self.registry
            .broadcast(event_id, broadcast, Some(user_id))
            .await;

        counter!("pipeline.updates").increment(1);
        Ok(updated)
    }

    /// Drop the sequencing entry for a participant who left the event.
    pub fn forget(&self, event_id: &str, user_id: &str) {
        self.in_flight
            .remove(&(event_id.to_string(), user_id.to_string()));
    }
}
