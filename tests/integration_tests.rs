//! Integration Tests Entry Point
//!
//! Tests are organized by module:
//! - `realtime/` - Gateway fan-out and group routing tests
//! - `calls/` - End-to-end call signaling tests
//! - `common/` - Shared test utilities

mod calls;
mod common;
mod realtime;
