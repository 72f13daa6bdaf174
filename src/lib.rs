//! # Signal Gateway Library
//!
//! Real-time distribution and call signaling service for the chat
//! platform:
//! - WebSocket gateway for group-scoped event fan-out
//! - Per-user call signaling bridges with SIP account provisioning
//! - PostgreSQL for membership and telephony records
//! - Redis for the subscriber roster cache
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Chat scopes, call state machine types, repository traits
//! - **Application Layer**: Call signaling bridge and SIP provisioning services
//! - **Infrastructure Layer**: Database, cache, and metrics implementations
//! - **Presentation Layer**: HTTP routes and the WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! signal_gateway/
//! +-- config/         Configuration management
//! +-- domain/         Scopes, call states, telephony entities, traits
//! +-- application/    Call bridge and provisioning services
//! +-- infrastructure/ Database, cache, and metrics implementations
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (error taxonomy)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
