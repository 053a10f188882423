//! # fleetd-telemetry
//!
//! Sample sources for the fleetd sidecar agent.
//!
//! This crate provides:
//! - Host counters and gauges from `/proc` and `statvfs`
//! - The stateful rate tracker turning absolute counters into
//!   percentages and throughput
//! - GPU telemetry via `nvidia-smi`, with a simulated backend for
//!   environments without GPUs
//!
//! Every source is best-effort: a reading that cannot be taken comes
//! back as an error (usually [`TelemetryError::Unavailable`]) that the
//! caller degrades into an absent snapshot field. Nothing here panics
//! or aborts collection of the other sources.

use thiserror::Error;

pub mod gpu;
pub mod host;
pub mod rates;

// Re-export main types
pub use gpu::{GpuSampler, GpuSamplerConfig};
pub use host::{CpuCounters, DiskUsage, LoadAverage, MemoryInfo, NetCounters};
pub use rates::RateTracker;

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur while sampling
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The signal cannot be read in this environment (no GPU, no
    /// `/proc`, counter not exposed). Expected and non-fatal.
    #[error("Signal unavailable: {0}")]
    Unavailable(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    /// Whether this error means the signal simply does not exist here,
    /// as opposed to a read that went wrong.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TelemetryError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TelemetryError::Unavailable("no gpu".to_string()).is_unavailable());
        assert!(!TelemetryError::Parse("bad line".to_string()).is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let error = TelemetryError::Unavailable("no /proc".to_string());
        assert_eq!(error.to_string(), "Signal unavailable: no /proc");
    }
}
