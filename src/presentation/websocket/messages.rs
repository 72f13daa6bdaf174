//! WebSocket Message Types
//!
//! Gateway wire format. Every frame is an `{op, d, s, t}` envelope;
//! broadcast payloads additionally carry the `{signalGroup, content}`
//! wrapper that routes a domain event to the members of one group.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::scope::ChatScope;

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch
    Dispatch = 0,
    /// Heartbeat
    Heartbeat = 1,
    /// Identify
    Identify = 2,
    /// Join a broadcast group
    JoinGroup = 3,
    /// Leave a broadcast group
    LeaveGroup = 4,
    /// Resume after a transport drop
    Resume = 6,
    /// Place an outgoing call
    CallDial = 8,
    /// Invalid session
    InvalidSession = 9,
    /// Hello
    Hello = 10,
    /// Heartbeat ACK
    HeartbeatAck = 11,
    /// Answer the pending incoming call
    CallAnswer = 12,
    /// Decline the pending incoming call
    CallReject = 13,
    /// Terminate the active call
    CallHangup = 14,
}

/// Incoming gateway message
#[derive(Debug, Deserialize)]
pub struct GatewayReceive {
    pub op: u8,
    pub d: Option<serde_json::Value>,
}

/// Outgoing gateway message
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySend {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// The broadcast envelope delivered verbatim to every member of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload<T> {
    #[serde(rename = "signalGroup")]
    pub signal_group: String,
    pub content: T,
}

impl<T> Payload<T> {
    pub fn new(signal_group: impl Into<String>, content: T) -> Self {
        Self {
            signal_group: signal_group.into(),
            content,
        }
    }
}

/// Hello payload (op 10)
#[derive(Debug, Serialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Identify payload (op 2)
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
}

/// Ready payload (dispatch READY)
#[derive(Debug, Serialize)]
pub struct ReadyPayload {
    pub connection_id: Uuid,
    pub user_id: i64,
}

/// Join payload (op 3): the scope to subscribe to.
#[derive(Debug, Deserialize)]
pub struct JoinPayload {
    pub scope: ChatScope,
}

/// Leave payload (op 4): the group tag to drop.
#[derive(Debug, Deserialize)]
pub struct LeavePayload {
    pub group: String,
}

/// Resume payload (op 6): group tags held before the transport drop.
#[derive(Debug, Deserialize)]
pub struct ResumePayload {
    pub groups: Vec<String>,
}

/// Resumed payload (dispatch RESUMED): the recovered membership. The
/// client re-fetches pending invitations upon receiving this.
#[derive(Debug, Serialize)]
pub struct ResumedPayload {
    pub groups: Vec<String>,
}

/// Call dial payload (op 8)
#[derive(Debug, Deserialize)]
pub struct CallDialPayload {
    pub remote_id: i64,
}

/// Error notification (dispatch ERROR)
#[derive(Debug, Serialize)]
pub struct ErrorNotice {
    pub kind: crate::shared::error::ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn payload_envelope_field_names() {
        let payload = Payload::new("channel:42", serde_json::json!({"id": 1}));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"signalGroup": "channel:42", "content": {"id": 1}})
        );
    }

    #[test]
    fn join_payload_parses_scope() {
        let payload: JoinPayload =
            serde_json::from_value(serde_json::json!({"scope": {"kind": "channel", "id": 42}}))
                .unwrap();
        assert_eq!(payload.scope, ChatScope::Channel(42));
    }
}
