//! # fleetd-core
//!
//! Shared primitives for the fleetd sidecar agent.
//!
//! This crate provides:
//! - Worker identity (instance id, worker id, served model)
//! - The credential store holding the control-plane bearer token
//! - The metric snapshot data model shared by the collector, the
//!   exposition endpoint, and the control-plane client

pub mod credential;
pub mod identity;
pub mod snapshot;

// Re-export commonly used types
pub use credential::CredentialStore;
pub use identity::WorkerIdentity;
pub use snapshot::{GpuReport, GpuSample, HostMetrics, ServiceSignal, Snapshot};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in core primitives
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
