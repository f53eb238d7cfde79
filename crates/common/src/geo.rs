// ================
// crates/common/src/geo.rs
// ================
//! Great-circle geometry and derived-status bucketing.
//!
//! All functions are total for numeric inputs. Callers are expected to hand
//! in latitudes in [-90, 90] and longitudes in [-180, 180]; out-of-range
//! values produce meaningless but non-crashing results.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Movement threshold in kilometers; positions closer than this are treated
/// as stationary noise.
pub const MOVEMENT_THRESHOLD_KM: f64 = 0.1;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True iff both components are inside their valid WGS84 range.
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Haversine great-circle distance to `other`, in kilometers.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        distance_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Haversine great-circle distance between two points, in kilometers.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// True iff the two positions are at least `threshold_km` apart.
pub fn has_moved_significantly(
    old_lat: f64,
    old_lng: f64,
    new_lat: f64,
    new_lng: f64,
    threshold_km: f64,
) -> bool {
    distance_km(old_lat, old_lng, new_lat, new_lng) >= threshold_km
}

/// Derived proximity status of a participant relative to the event location.
///
/// Never persisted on its own; always recomputed from the distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Arrived,
    Close,
    Moving,
    Far,
}

impl ParticipantStatus {
    /// Bucket a distance in kilometers. Boundaries are exact: a distance of
    /// 0.1 km is `Close`, 1 km is `Moving`, 10 km is `Far`.
    pub fn from_distance_km(distance_km: f64) -> Self {
        if distance_km < 0.1 {
            ParticipantStatus::Arrived
        } else if distance_km < 1.0 {
            ParticipantStatus::Close
        } else if distance_km < 10.0 {
            ParticipantStatus::Moving
        } else {
            ParticipantStatus::Far
        }
    }
}

/// Human-readable distance, locale naive. Under a kilometer switches to
/// meters.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{:.0} m", km * 1000.0)
    } else {
        format!("{km:.1} km")
    }
}

/// Human-readable ETA, locale naive.
pub fn format_eta(minutes: f64) -> String {
    let total = minutes.round() as i64;
    if total < 1 {
        "<1 min".to_string()
    } else if total < 60 {
        format!("{total} min")
    } else {
        format!("{} h {:02} min", total / 60, total % 60)
    }
}
