//! Inference-runtime HTTP client

use crate::signals::{find_gauge, RUNNING_GAUGE_NAMES, WAITING_GAUGE_NAMES};
use crate::{Result, RuntimeError};
use fleetd_core::ServiceSignal;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Readiness of the local inference runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Runtime unreachable, erroring, or not serving the pinned model
    NotReady,
    /// Runtime reachable and no specific model is required
    ReadyNoModel,
    /// Runtime reachable and the pinned model is in its listing
    Ready,
}

impl Readiness {
    /// Whether this state counts as ready for probes and heartbeats.
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready | Readiness::ReadyNoModel)
    }

    /// Worker status string reported to the control plane.
    pub fn status(&self) -> &'static str {
        if self.is_ready() {
            "ready"
        } else {
            "starting"
        }
    }
}

/// Configuration for the runtime client.
#[derive(Debug, Clone)]
pub struct RuntimeClientConfig {
    /// Base URL of the runtime (no trailing slash)
    pub base_url: String,

    /// Metrics exposition URL (defaults to `<base>/metrics`)
    pub metrics_url: String,

    /// Model the worker is expected to serve, if pinned
    pub model_id: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for RuntimeClientConfig {
    fn default() -> Self {
        let base_url = "http://127.0.0.1:8000".to_string();
        Self {
            metrics_url: format!("{}/metrics", base_url),
            base_url,
            model_id: None,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Model listing response (`GET /v1/models`, OpenAI-compatible)
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
}

/// HTTP client for the co-located inference runtime.
pub struct RuntimeClient {
    config: RuntimeClientConfig,
    client: Client,
}

impl RuntimeClient {
    pub fn new(config: RuntimeClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RuntimeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RuntimeClientConfig {
        &self.config
    }

    /// Evaluate runtime readiness.
    ///
    /// Transport failures and non-2xx statuses map to
    /// [`Readiness::NotReady`]; they are expected while the runtime
    /// starts up and never bubble out as errors.
    pub async fn check_ready(&self) -> Readiness {
        let url = format!("{}/v1/models", self.config.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("runtime models request failed: {}", e);
                return Readiness::NotReady;
            }
        };

        if !response.status().is_success() {
            debug!("runtime models request returned {}", response.status());
            return Readiness::NotReady;
        }

        let Some(model_id) = &self.config.model_id else {
            return Readiness::ReadyNoModel;
        };

        // A malformed listing counts as "model not visible".
        let models: ModelsResponse = match response.json().await {
            Ok(models) => models,
            Err(e) => {
                debug!("runtime models response unparseable: {}", e);
                return Readiness::NotReady;
            }
        };

        if models.data.iter().any(|m| &m.id == model_id) {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    /// Scrape best-effort load signals from the runtime's metrics
    /// exposition. Any failure yields an empty signal set.
    pub async fn scrape_signals(&self) -> ServiceSignal {
        let response = match self.client.get(&self.config.metrics_url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("runtime metrics request failed: {}", e);
                return ServiceSignal::default();
            }
        };

        if !response.status().is_success() {
            debug!("runtime metrics request returned {}", response.status());
            return ServiceSignal::default();
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!("runtime metrics body unreadable: {}", e);
                return ServiceSignal::default();
            }
        };

        let waiting = find_gauge(&text, WAITING_GAUGE_NAMES);
        let running = find_gauge(&text, RUNNING_GAUGE_NAMES);

        ServiceSignal {
            requests_waiting: waiting,
            requests_running: running,
            queue_depth: waiting.map(|w| w.max(0.0) as u64),
        }
    }
}
