// ==============================
// crates/client/src/scheduler.rs
// ==============================
//! Throttled ETA recomputation for the event roster.
//!
//! Gateway calls are the expensive resource here, so full recomputations
//! are rationed to one per refresh interval. Between refreshes the
//! scheduler still answers with live `should_leave_now` values, re-derived
//! from the cached `leave_by` deadlines against the caller's clock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rendezvous_common::departure;
use rendezvous_common::geo::ParticipantStatus;
use rendezvous_common::{EventContext, Participant};
use rendezvous_directions::{DirectionsProvider, TravelMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-participant travel estimate, as shown in the roster UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantEta {
    pub participant_id: String,
    pub distance_km: Option<f64>,
    pub eta_minutes: f64,
    pub status: ParticipantStatus,
    /// Absent when the participant has no position or no route was found.
    pub leave_by: Option<DateTime<Utc>>,
    pub should_leave_now: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between full (gateway-backed) recomputations.
    pub refresh_interval: Duration,
    /// Pause between consecutive gateway calls within one recomputation.
    pub inter_call_delay: Duration,
    pub travel_mode: TravelMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            inter_call_delay: Duration::from_millis(200),
            travel_mode: TravelMode::Driving,
        }
    }
}

#[derive(Default)]
struct SchedulerInner {
    last_refresh: Option<DateTime<Utc>>,
    cached: Vec<ParticipantEta>,
    in_flight: bool,
}

pub struct EtaRefreshScheduler {
    config: SchedulerConfig,
    directions: Arc<dyn DirectionsProvider>,
    inner: Mutex<SchedulerInner>,
}

impl EtaRefreshScheduler {
    pub fn new(config: SchedulerConfig, directions: Arc<dyn DirectionsProvider>) -> Self {
        Self {
            config,
            directions,
            inner: Mutex::new(SchedulerInner::default()),
        }
    }

    /// Recompute estimates for the whole roster.
    ///
    /// When the previous full recomputation is younger than the refresh
    /// interval and `force` is false, no gateway call is made: the cached
    /// rows come back with `should_leave_now` re-derived against `now`.
    pub async fn refresh(
        &self,
        event: &EventContext,
        roster: &[Participant],
        force: bool,
        now: DateTime<Utc>,
    ) -> Vec<ParticipantEta> {
        {
            let mut inner = self.inner.lock();
            let fresh = inner.last_refresh.is_some_and(|at| {
                now.signed_duration_since(at).to_std().is_ok_and(|age| age < self.config.refresh_interval)
            });
            if fresh && !force {
                return inner
                    .cached
                    .iter()
                    .map(|row| rederive(row, now))
                    .collect();
            }
            inner.in_flight = true;
        }

        let rows = self.recompute(event, roster, now).await;

        let mut inner = self.inner.lock();
        inner.last_refresh = Some(now);
        inner.cached = rows.clone();
        inner.in_flight = false;
        rows
    }

    async fn recompute(
        &self,
        event: &EventContext,
        roster: &[Participant],
        now: DateTime<Utc>,
    ) -> Vec<ParticipantEta> {
        let mut rows = Vec::with_capacity(roster.len());
        let mut called_gateway = false;

        for participant in roster {
            let position = participant.last_position();
            let destination = event.location;
            let (position, destination) = match (position, destination) {
                (Some(p), Some(d)) => (p, d),
                _ => {
                    rows.push(ParticipantEta {
                        participant_id: participant.id.clone(),
                        distance_km: None,
                        eta_minutes: 0.0,
                        status: ParticipantStatus::Far,
                        leave_by: None,
                        should_leave_now: false,
                    });
                    continue;
                }
            };

            if called_gateway {
                tokio::time::sleep(self.config.inter_call_delay).await;
            }
            let route = self
                .directions
                .directions(position, destination, self.config.travel_mode)
                .await;
            called_gateway = true;

            let distance_km = position.distance_km(&destination);
            let row = match route {
                Some(route) => {
                    let eta_minutes = route.duration_minutes();
                    let deadline = departure::leave_by(event.starts_at, eta_minutes);
                    ParticipantEta {
                        participant_id: participant.id.clone(),
                        distance_km: Some(distance_km),
                        eta_minutes,
                        status: ParticipantStatus::from_distance_km(distance_km),
                        leave_by: Some(deadline),
                        should_leave_now: now >= deadline,
                    }
                }
                None => {
                    debug!(participant_id = %participant.id, "no route, keeping straight-line distance only");
                    ParticipantEta {
                        participant_id: participant.id.clone(),
                        distance_km: Some(distance_km),
                        eta_minutes: 0.0,
                        status: ParticipantStatus::from_distance_km(distance_km),
                        leave_by: None,
                        should_leave_now: false,
                    }
                }
            };
            rows.push(row);
        }
        rows
    }

    /// Whether the cached rows are older than one refresh interval.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        !self.inner.lock().last_refresh.is_some_and(|at| {
            now.signed_duration_since(at)
                .to_std()
                .is_ok_and(|age| age < self.config.refresh_interval)
        })
    }

    /// Whether a full recomputation is currently running.
    pub fn is_calculating(&self) -> bool {
        self.inner.lock().in_flight
    }
}

fn rederive(row: &ParticipantEta, now: DateTime<Utc>) -> ParticipantEta {
    ParticipantEta {
        should_leave_now: row.leave_by.is_some_and(|deadline| now >= deadline),
        ..row.clone()
    }
}
