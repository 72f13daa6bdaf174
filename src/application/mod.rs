//! # Application Layer
//!
//! Services coordinating the domain: the per-user call signaling bridge
//! and the SIP provisioning service.

pub mod services;

pub use services::{CallBridge, CallSession, CallTransport, SipProvisioner};
