//! Configuration for the fleetd agent
//!
//! Everything is driven by environment variables with working defaults,
//! so the agent runs with zero configuration against a local runtime.

use crate::control_plane::ControlPlaneConfig;
use crate::{AgentError, Result};
use fleetd_core::{CredentialStore, WorkerIdentity};
use fleetd_runtime::RuntimeClientConfig;
use fleetd_telemetry::GpuSamplerConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for the fleetd agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    /// Control plane base URL; empty disables registration/heartbeats
    pub control_plane_url: String,

    /// Bearer token supplied at start, if any
    #[serde(skip_serializing)]
    pub worker_auth_token: Option<String>,

    /// File the bearer token is loaded from / persisted to
    pub worker_auth_token_file: Option<PathBuf>,

    /// Provisioning instance identifier
    pub instance_id: String,

    /// Worker identifier; generated when unset
    pub worker_id: Option<String>,

    /// Model this worker is expected to serve
    pub model_id: Option<String>,

    /// Base URL of the co-located inference runtime
    pub runtime_base_url: String,

    /// Metrics exposition URL of the runtime
    pub runtime_metrics_url: String,

    /// Port the local health/metrics server listens on
    pub health_port: u16,

    /// Port the runtime serves inference on (reported to the control plane)
    pub runtime_port: u16,

    /// Heartbeat/collection interval in seconds
    pub heartbeat_interval_s: f64,

    /// Mount point measured for disk usage
    pub disk_path: String,

    /// IP address advertised to the control plane; discovered when unset
    pub advertise_ip: Option<String>,

    /// Number of GPUs to simulate when no hardware is present (0 = off)
    pub simulate_gpu_count: u32,

    /// VRAM per simulated GPU in MB
    pub simulate_gpu_vram_mb: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        let runtime_base_url = "http://127.0.0.1:8000".to_string();
        Self {
            control_plane_url: String::new(),
            worker_auth_token: None,
            worker_auth_token_file: None,
            instance_id: String::new(),
            worker_id: None,
            model_id: None,
            runtime_metrics_url: format!("{}/metrics", runtime_base_url),
            runtime_base_url,
            health_port: 8080,
            runtime_port: 8000,
            heartbeat_interval_s: 4.0,
            disk_path: "/".to_string(),
            advertise_ip: None,
            simulate_gpu_count: 0,
            simulate_gpu_vram_mb: 24576,
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Malformed numeric values fall back to their defaults rather than
    /// failing startup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let string = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let nonempty = |key: &str| string(key).filter(|v| !v.is_empty());
        let trimmed_url = |key: &str| nonempty(key).map(|v| v.trim_end_matches('/').to_string());

        fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        let runtime_base_url =
            trimmed_url("VLLM_BASE_URL").unwrap_or_else(|| defaults.runtime_base_url.clone());
        let runtime_metrics_url = trimmed_url("VLLM_METRICS_URL")
            .unwrap_or_else(|| format!("{}/metrics", runtime_base_url));

        Self {
            control_plane_url: trimmed_url("CONTROL_PLANE_URL").unwrap_or_default(),
            worker_auth_token: nonempty("WORKER_AUTH_TOKEN"),
            worker_auth_token_file: nonempty("WORKER_AUTH_TOKEN_FILE").map(PathBuf::from),
            instance_id: nonempty("INSTANCE_ID").unwrap_or_default(),
            worker_id: nonempty("WORKER_ID"),
            model_id: nonempty("MODEL_ID"),
            runtime_base_url,
            runtime_metrics_url,
            health_port: parse_or(nonempty("WORKER_HEALTH_PORT"), defaults.health_port),
            runtime_port: parse_or(nonempty("WORKER_VLLM_PORT"), defaults.runtime_port),
            heartbeat_interval_s: parse_or(
                nonempty("WORKER_HEARTBEAT_INTERVAL_S"),
                defaults.heartbeat_interval_s,
            ),
            disk_path: nonempty("WORKER_DISK_PATH").unwrap_or_else(|| defaults.disk_path.clone()),
            advertise_ip: nonempty("WORKER_ADVERTISE_IP"),
            simulate_gpu_count: parse_or(
                nonempty("WORKER_SIMULATE_GPU_COUNT"),
                defaults.simulate_gpu_count,
            ),
            simulate_gpu_vram_mb: parse_or(
                nonempty("WORKER_SIMULATE_GPU_VRAM_MB"),
                defaults.simulate_gpu_vram_mb,
            ),
            logging: LoggingConfig {
                level: nonempty("FLEETD_LOG_LEVEL").unwrap_or_else(|| defaults.logging.level.clone()),
                format: nonempty("FLEETD_LOG_FORMAT")
                    .unwrap_or_else(|| defaults.logging.format.clone()),
            },
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_s <= 0.0 || !self.heartbeat_interval_s.is_finite() {
            return Err(AgentError::Config(format!(
                "heartbeat interval must be positive, got {}",
                self.heartbeat_interval_s
            )));
        }

        if self.runtime_base_url.is_empty() {
            return Err(AgentError::Config(
                "runtime base URL cannot be empty".to_string(),
            ));
        }

        if self.disk_path.is_empty() {
            return Err(AgentError::Config("disk path cannot be empty".to_string()));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(AgentError::Config(format!("Invalid log level: {}", other)));
            }
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(AgentError::Config(format!("Invalid log format: {}", other)));
            }
        }

        Ok(())
    }

    /// Heartbeat interval as a duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_s)
    }

    /// Build the process identity from this configuration.
    pub fn identity(&self) -> WorkerIdentity {
        WorkerIdentity::new(
            self.instance_id.clone(),
            self.worker_id.clone(),
            self.model_id.clone(),
        )
    }

    /// Build the credential store from this configuration.
    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(
            self.worker_auth_token.clone(),
            self.worker_auth_token_file.clone(),
        )
    }

    /// Runtime client configuration derived from this configuration.
    pub fn runtime_client_config(&self) -> RuntimeClientConfig {
        RuntimeClientConfig {
            base_url: self.runtime_base_url.clone(),
            metrics_url: self.runtime_metrics_url.clone(),
            model_id: self.model_id.clone(),
            timeout: Duration::from_secs(2),
        }
    }

    /// Control-plane client configuration derived from this configuration.
    pub fn control_plane_config(&self) -> ControlPlaneConfig {
        ControlPlaneConfig {
            base_url: self.control_plane_url.clone(),
            runtime_port: self.runtime_port,
            health_port: self.health_port,
            advertise_ip: self.advertise_ip.clone(),
            ..ControlPlaneConfig::default()
        }
    }

    /// GPU sampler configuration derived from this configuration.
    pub fn gpu_sampler_config(&self) -> GpuSamplerConfig {
        GpuSamplerConfig {
            simulate_gpu_count: self.simulate_gpu_count,
            simulate_gpu_vram_mb: self.simulate_gpu_vram_mb,
            ..GpuSamplerConfig::default()
        }
    }
}
