// ================
// crates/common/src/protocol.rs
// ================
//! WebSocket protocol messages.
//!
//! Messages are internally tagged sum types so that dispatch is exhaustive
//! at compile time and the wire names stay stable (`location_update`,
//! `eta_updated`, ...). Unknown payloads fail to parse and are answered
//! with an `error` reply rather than a close.

use crate::types::UserSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages accepted from an authenticated, open channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    /// A raw position sample from a participant of `event_id`.
    LocationUpdate {
        event_id: String,
        lat: f64,
        lng: f64,
    },
    /// Explicit, idempotent join of the event's roster and room.
    ParticipantJoined { event_id: String },
    /// Leave the event's roster and room.
    ParticipantLeft { event_id: String },
    /// Liveness probe; answered with `pong`.
    Ping,
}

/// Messages emitted by the server, either as direct replies or as room
/// broadcasts. Delivery is best-effort: clients treat broadcasts as hints
/// and resync full state after a reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    EtaUpdated {
        event_id: String,
        participant_id: String,
        /// Estimated travel time in minutes; 0 means unknown.
        eta: f64,
        /// Distance to the event location in kilometers; 0 when the event
        /// has no coordinates.
        distance: f64,
        is_moving: bool,
        timestamp: DateTime<Utc>,
    },
    ParticipantJoined {
        event_id: String,
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        event_id: String,
        participant_id: String,
    },
    EventDeleted {
        event_id: String,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        code: String,
        message: String,
    },
}

/// What a `participant_joined` broadcast carries about the newcomer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    pub user: UserSummary,
}

/// Why a handshake was rejected. Connections without a valid token never
/// reach the open state; the close frame carries a distinguishable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TokenRequired,
    TokenInvalid,
}

impl RejectReason {
    pub fn close_code(self) -> u16 {
        match self {
            RejectReason::TokenRequired => 4001,
            RejectReason::TokenInvalid => 4003,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::TokenRequired => "token_required",
            RejectReason::TokenInvalid => "token_invalid",
        }
    }
}
