// ================
// crates/common/src/departure.rs
// ================
//! Leave-by deadline arithmetic.
//!
//! Pure functions of explicit timestamps so the countdown can be recomputed
//! against wall-clock time on every tick without touching the directions
//! provider.

use chrono::{DateTime, Duration, Utc};

/// Participants should arrive this many minutes before the event starts.
pub const ARRIVAL_BUFFER_MINUTES: i64 = 5;

/// The moment a participant should be standing at the event location.
pub fn target_arrival(event_at: DateTime<Utc>) -> DateTime<Utc> {
    event_at - Duration::minutes(ARRIVAL_BUFFER_MINUTES)
}

/// Latest departure time that still makes the target arrival, given the
/// current travel estimate.
pub fn leave_by(event_at: DateTime<Utc>, eta_minutes: f64) -> DateTime<Utc> {
    target_arrival(event_at) - Duration::seconds((eta_minutes * 60.0).round() as i64)
}

/// Whether the departure deadline has already passed.
pub fn should_leave_now(now: DateTime<Utc>, event_at: DateTime<Utc>, eta_minutes: f64) -> bool {
    now >= leave_by(event_at, eta_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn leave_by_subtracts_buffer_and_eta() {
        // Event at 18:00, ETA 20 min: target arrival 17:55, leave by 17:35.
        let event_at = at(18, 0);
        assert_eq!(target_arrival(event_at), at(17, 55));
        assert_eq!(leave_by(event_at, 20.0), at(17, 35));
    }

    #[test]
    fn should_leave_now_compares_against_deadline() {
        let event_at = at(18, 0);
        assert!(should_leave_now(at(17, 40), event_at, 20.0));
        assert!(!should_leave_now(at(17, 0), event_at, 20.0));
        // Exactly at the deadline counts as "leave now".
        assert!(should_leave_now(at(17, 35), event_at, 20.0));
    }

    #[test]
    fn unknown_eta_falls_back_to_target_arrival() {
        let event_at = at(18, 0);
        assert_eq!(leave_by(event_at, 0.0), at(17, 55));
    }
}
