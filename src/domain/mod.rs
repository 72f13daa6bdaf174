//! # Domain Layer
//!
//! Core vocabulary of the real-time subsystem, independent of transport and
//! storage concerns.
//!
//! - **scope**: chat scopes and the group-tag grammar
//! - **call**: call session states, directions, and lifecycle events
//! - **telephony**: provisioned SIP account entities
//! - **repositories**: data-access and authorization contracts

pub mod call;
pub mod repositories;
pub mod scope;
pub mod telephony;

pub use call::{CallDirection, CallEvent, CallState, TransportUpdate};
pub use repositories::{ScopeAuthorizer, TelephonyRepository};
pub use scope::ChatScope;
pub use telephony::{SipAccount, SipCredentials, ALLOWED_CODEC, SIP_TRANSPORT};

#[cfg(test)]
pub use repositories::{MockScopeAuthorizer, MockTelephonyRepository};
