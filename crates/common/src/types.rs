// ================
// crates/common/src/types.rs
// ================
//! Domain types shared across crates.

use crate::geo::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's membership record in an event, carrying the last-known position
/// and the derived movement state. At most one row exists per
/// (`event_id`, `user_id`) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub last_lat: Option<f64>,
    pub last_lng: Option<f64>,
    pub last_location_at: Option<DateTime<Utc>>,
    pub is_moving: bool,
    pub distance_to_event_km: Option<f64>,
    pub estimated_arrival: Option<DateTime<Utc>>,
}

impl Participant {
    /// Last recorded position, if any.
    pub fn last_position(&self) -> Option<Coordinates> {
        match (self.last_lat, self.last_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }
}

/// The slice of a user record carried in broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
}

/// Read-only event context consumed by the coordination engine. The event
/// itself is owned by the external CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub id: String,
    pub location_name: String,
    pub location: Option<Coordinates>,
    pub starts_at: DateTime<Utc>,
    pub allow_location_sharing: bool,
    pub creator_id: String,
}
