// ================
// crates/common/src/lib.rs
// ================
//! Common types shared between the rendezvous server and client.
//!
//! This crate defines the WebSocket protocol messages, the geometry helpers
//! used to derive distance and movement state, and the leave-by arithmetic.
//! Everything in here is pure: no I/O, no clocks, no transport.

pub mod departure;
pub mod geo;
pub mod protocol;
pub mod types;

pub use geo::{Coordinates, ParticipantStatus};
pub use protocol::{ClientToServer, RejectReason, ServerToClient};
pub use types::{EventContext, Participant, UserSummary};
