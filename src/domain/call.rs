//! Call Signaling Types
//!
//! State machine vocabulary for one telephony negotiation. A session moves
//! `Connecting -> [Progress]* -> Confirmed -> Ended`, or drops to `Failed`
//! from any non-terminal state. `Ended` and `Failed` are terminal: once a
//! session reaches either, every later event is discarded and the session's
//! slot is released.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether the local side placed or received the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Lifecycle state of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Negotiation started; no answer from the remote party yet.
    Connecting,
    /// Provisional signaling received (ringing and similar). Informational.
    Progress,
    /// Answered; media negotiation completed.
    Confirmed,
    /// Terminated normally by either party. Terminal.
    Ended,
    /// Negotiation error, rejection, busy, or timeout. Terminal.
    Failed,
}

impl CallState {
    /// Terminal states discard all later events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    /// States in which the call is still being negotiated.
    pub fn is_pending(&self) -> bool {
        matches!(self, CallState::Connecting | CallState::Progress)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Connecting => "connecting",
            CallState::Progress => "progress",
            CallState::Confirmed => "confirmed",
            CallState::Ended => "ended",
            CallState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A signaling update arriving from the underlying transport.
///
/// These may arrive out of order relative to local operations; the bridge
/// resolves races in favor of the first terminal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportUpdate {
    /// Provisional response from the remote party.
    Progress,
    /// The remote party answered and media is negotiated.
    Confirmed,
    /// Negotiation failed, was rejected, or the remote is busy.
    Failed { reason: String },
    /// The remote party hung up a call that had not failed.
    Ended,
}

/// Lifecycle event emitted on a session's event stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallEvent {
    Connecting { call_id: Uuid, remote_id: i64 },
    Progress { call_id: Uuid },
    Confirmed { call_id: Uuid },
    Failed { call_id: Uuid, reason: String },
    Ended { call_id: Uuid },
}

impl CallEvent {
    /// The session this event belongs to.
    pub fn call_id(&self) -> Uuid {
        match self {
            CallEvent::Connecting { call_id, .. }
            | CallEvent::Progress { call_id }
            | CallEvent::Confirmed { call_id }
            | CallEvent::Failed { call_id, .. }
            | CallEvent::Ended { call_id } => *call_id,
        }
    }
}
