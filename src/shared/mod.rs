//! Shared utilities used across all layers.

pub mod error;

pub use error::{AppError, ErrorKind, ErrorResponse, Severity};
