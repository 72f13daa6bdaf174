//! Telephony Entities
//!
//! A provisioned SIP account is three linked records on the PBX side: an
//! address-of-record, an authentication credential, and an endpoint
//! definition referencing both. All three are keyed by the stringified
//! user id and outlive any individual call session.

use serde::{Deserialize, Serialize};

/// Transport the PBX accepts registrations over.
pub const SIP_TRANSPORT: &str = "transport-wss";

/// The single audio codec allowed end-to-end.
pub const ALLOWED_CODEC: &str = "opus";

/// A fully provisioned telephony identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipAccount {
    /// Endpoint id, the stringified user id.
    pub endpoint_id: String,
    /// Auth username; equals the endpoint id.
    pub username: String,
    /// Auth password supplied at provisioning time.
    pub password: String,
    /// Address-of-record the endpoint registers against.
    pub aor: String,
    /// Maximum simultaneous registrations for the AOR.
    pub max_contacts: i32,
}

/// The `{username, password}` pair a client registers its SIP user agent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipCredentials {
    pub username: String,
    pub password: String,
}

impl SipAccount {
    /// Registration credentials for this account.
    pub fn credentials(&self) -> SipCredentials {
        SipCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}
