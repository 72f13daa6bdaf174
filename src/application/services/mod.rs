//! Application services.

pub mod call_bridge;
pub mod provisioner;

pub use call_bridge::{CallBridge, CallSession, CallTransport};
pub use provisioner::SipProvisioner;
