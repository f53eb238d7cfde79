// =============================
// crates/client/src/reporter.rs
// =============================
//! Periodic location reporter.
//!
//! Samples a platform position source on a fixed cadence and pushes
//! filtered readings down the channel. Filtering is pure and lives in
//! [`SampleFilter`] so it can be tested without a clock or a socket.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rendezvous_common::geo::Coordinates;
use rendezvous_common::ClientToServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One reading from the platform's location service.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    pub coords: Coordinates,
    /// Horizontal accuracy radius in meters.
    pub accuracy_m: f64,
    /// When the platform captured the fix, not when we asked for it.
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over the platform geolocation API.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> Result<PositionSample, PositionError>;
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub event_id: String,
    pub report_interval: Duration,
    /// Wait this long after the channel opens before the first sample, so
    /// the join handshake settles first.
    pub start_delay: Duration,
    /// Reject fixes with a worse accuracy radius than this.
    pub max_accuracy_m: f64,
    /// Reject fixes older than this at sample time.
    pub max_age: Duration,
    /// Suppress a fix that moved less than this since the last emitted one.
    pub min_movement_km: f64,
    /// ...unless this much time has passed since the last emit.
    pub max_suppression: Duration,
}

impl ReporterConfig {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            report_interval: Duration::from_secs(10),
            start_delay: Duration::from_secs(1),
            max_accuracy_m: 50.0,
            max_age: Duration::from_secs(5),
            min_movement_km: 0.005,
            max_suppression: Duration::from_secs(15),
        }
    }
}

/// Why a sample was dropped, or `Emit` if it should go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Emit,
    Inaccurate,
    Stale,
    Redundant,
}

/// Pure filter over a stream of samples. Time flows in through the
/// `now` argument so tests never sleep.
#[derive(Debug)]
pub struct SampleFilter {
    max_accuracy_m: f64,
    max_age: Duration,
    min_movement_km: f64,
    max_suppression: Duration,
    last_emitted: Option<(Coordinates, DateTime<Utc>)>,
}

impl SampleFilter {
    pub fn new(config: &ReporterConfig) -> Self {
        Self {
            max_accuracy_m: config.max_accuracy_m,
            max_age: config.max_age,
            min_movement_km: config.min_movement_km,
            max_suppression: config.max_suppression,
            last_emitted: None,
        }
    }

    pub fn decide(&mut self, sample: &PositionSample, now: DateTime<Utc>) -> FilterDecision {
        if sample.accuracy_m > self.max_accuracy_m {
            return FilterDecision::Inaccurate;
        }
        let age = now.signed_duration_since(sample.captured_at);
        if age > chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::zero()) {
            return FilterDecision::Stale;
        }
        if let Some((last_coords, last_at)) = &self.last_emitted {
            let moved_km = last_coords.distance_km(&sample.coords);
            let since_last = now.signed_duration_since(*last_at);
            let suppression_window = chrono::Duration::from_std(self.max_suppression)
                .unwrap_or(chrono::Duration::zero());
            if moved_km < self.min_movement_km && since_last < suppression_window {
                return FilterDecision::Redundant;
            }
        }
        self.last_emitted = Some((sample.coords, now));
        FilterDecision::Emit
    }
}

/// Drives the sample/filter/send loop on a background task.
///
/// `start` is idempotent while running; `stop` is idempotent always.
pub struct LocationReporter {
    config: ReporterConfig,
    source: Arc<dyn PositionSource>,
    outbound: mpsc::Sender<ClientToServer>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LocationReporter {
    pub fn new(
        config: ReporterConfig,
        source: Arc<dyn PositionSource>,
        outbound: mpsc::Sender<ClientToServer>,
    ) -> Self {
        Self {
            config,
            source,
            outbound,
            task: Mutex::new(None),
        }
    }

    /// Begin reporting after the configured start delay. A second call
    /// while the loop is running is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let config = self.config.clone();
        let source = Arc::clone(&self.source);
        let outbound = self.outbound.clone();
        *task = Some(tokio::spawn(run_reporter(config, source, outbound)));
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for LocationReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tie a reporter's lifecycle to the channel state: start (after the
/// configured delay) whenever the channel opens, stop on anything else.
/// Returns the supervising task; abort it to release the reporter.
pub fn supervise(
    reporter: Arc<LocationReporter>,
    mut state: tokio::sync::watch::Receiver<crate::channel::ChannelState>,
) -> JoinHandle<()> {
    use crate::channel::ChannelState;
    tokio::spawn(async move {
        loop {
            match *state.borrow_and_update() {
                ChannelState::Open => reporter.start(),
                _ => reporter.stop(),
            }
            if state.changed().await.is_err() {
                reporter.stop();
                return;
            }
        }
    })
}

async fn run_reporter(
    config: ReporterConfig,
    source: Arc<dyn PositionSource>,
    outbound: mpsc::Sender<ClientToServer>,
) {
    tokio::time::sleep(config.start_delay).await;
    let mut filter = SampleFilter::new(&config);
    let mut ticker = tokio::time::interval(config.report_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        // Any position failure skips this tick; the next scheduled tick
        // retries, so a transient denial never kills the loop.
        let sample = match source.current_position().await {
            Ok(sample) => sample,
            Err(PositionError::PermissionDenied) => {
                warn!("location permission denied, skipping tick");
                continue;
            }
            Err(err) => {
                debug!(%err, "position read failed");
                continue;
            }
        };
        match filter.decide(&sample, Utc::now()) {
            FilterDecision::Emit => {
                let msg = ClientToServer::LocationUpdate {
                    event_id: config.event_id.clone(),
                    lat: sample.coords.lat,
                    lng: sample.coords.lng,
                };
                if outbound.send(msg).await.is_err() {
                    debug!("channel closed, reporter stopping");
                    return;
                }
            }
            decision => debug!(?decision, "sample filtered"),
        }
    }
}
