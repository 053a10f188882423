//! # fleetd-runtime
//!
//! Client for the co-located inference runtime (vLLM-compatible).
//!
//! This crate provides:
//! - Readiness evaluation against the runtime's `/v1/models` listing
//! - Best-effort load signals (queue depth, in-flight requests) scraped
//!   from the runtime's own Prometheus exposition
//!
//! Both checks are idempotent and side-effect free; the driver loop and
//! every probe handler may run them concurrently.

use thiserror::Error;

pub mod client;
pub mod signals;

// Re-export main types
pub use client::{Readiness, RuntimeClient, RuntimeClientConfig};
pub use signals::find_gauge;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur talking to the inference runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RuntimeError::Connection("refused".to_string());
        assert_eq!(error.to_string(), "Connection error: refused");
    }
}
