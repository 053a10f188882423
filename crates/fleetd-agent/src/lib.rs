//! # fleetd-agent
//!
//! The fleetd sidecar daemon.
//!
//! This crate ties the sample sources, the inference-runtime client,
//! and the control-plane protocol together: a periodic driver loop
//! evaluates readiness, registers the worker, and sends heartbeats,
//! while a concurrently running HTTP server exposes liveness, readiness,
//! and a Prometheus scrape of the current snapshot.

pub mod agent;
pub mod collector;
pub mod config;
pub mod control_plane;
pub mod events;
pub mod exposition;

// Re-export commonly used types
pub use agent::Agent;
pub use config::AgentConfig;
pub use control_plane::{ControlPlaneClient, ControlPlaneConfig};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Exposition error: {0}")]
    Exposition(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] fleetd_core::CoreError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] fleetd_runtime::RuntimeError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Initialize the agent with logging
pub async fn init_agent(config: &AgentConfig) -> Result<Agent> {
    init_logging(&config.logging)?;

    tracing::info!(
        "initializing fleetd agent worker_id={} instance_id={}",
        config.worker_id.as_deref().unwrap_or("<generated>"),
        if config.instance_id.is_empty() {
            "<unset>"
        } else {
            &config.instance_id
        },
    );

    Agent::new(config.clone()).await
}

/// Initialize logging and tracing
fn init_logging(logging_config: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    // try_init so embedding in tests (or double initialization) is harmless.
    let result = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }

    Ok(())
}
