//! # Infrastructure Layer
//!
//! Concrete implementations of the domain contracts: PostgreSQL
//! repositories, the Redis roster cache, and Prometheus metrics.

pub mod cache;
pub mod database;
pub mod metrics;
pub mod repositories;
