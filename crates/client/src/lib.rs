// ============================
// crates/client/src/lib.rs
// ============================
//! Client side of the rendezvous coordination engine.
//!
//! Three pieces: a reconnecting WebSocket channel, the location reporter
//! that samples and filters device positions, and the ETA refresh scheduler
//! that recomputes the roster's travel estimates through the directions
//! gateway. The UI distinguishes three independent signals: the channel
//! state (disconnected/reconnecting), the scheduler's in-flight flag
//! (calculating), and its staleness flag (stale data).

pub mod channel;
pub mod reporter;
pub mod scheduler;

pub use channel::{ChannelConfig, ChannelState, EventChannel};
pub use reporter::{
    supervise, LocationReporter, PositionError, PositionSample, PositionSource, ReporterConfig,
};
pub use scheduler::{EtaRefreshScheduler, ParticipantEta, SchedulerConfig};
