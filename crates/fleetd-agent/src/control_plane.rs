//! Control-plane registration and heartbeat client
//!
//! The client is a two-state machine: `unregistered` until the first
//! successful registration, `registered` forever after. Heartbeat
//! failures never roll the state back; transport errors are retried at
//! the driver loop's fixed cadence, indefinitely.

use crate::{AgentError, Result};
use fleetd_core::{CredentialStore, Snapshot, WorkerIdentity};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the control-plane client.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Control-plane base URL (no trailing slash); empty disables the client
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Inference port reported at registration
    pub runtime_port: u16,

    /// Local health/metrics port reported at registration
    pub health_port: u16,

    /// Advertised IP override; discovered when unset
    pub advertise_ip: Option<String>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout: Duration::from_secs(3),
            runtime_port: 8000,
            health_port: 8080,
            advertise_ip: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterRequest {
    instance_id: String,
    worker_id: String,
    model_id: Option<String>,
    vllm_port: u16,
    health_port: u16,
    ip_address: Option<String>,
    metadata: serde_json::Value,
}

/// Registration response; may carry a bootstrap credential.
#[derive(Debug, Default, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    bootstrap_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest {
    instance_id: String,
    worker_id: String,
    status: String,
    model_id: Option<String>,
    queue_depth: Option<u64>,
    gpu_utilization: Option<f64>,
    gpu_mem_used_mb: Option<f64>,
    ip_address: Option<String>,
    metadata: serde_json::Value,
}

/// Client for the fleet control plane.
pub struct ControlPlaneClient {
    config: ControlPlaneConfig,
    client: Client,
    identity: WorkerIdentity,
    credentials: Arc<CredentialStore>,
    ip_address: Option<String>,
    registered: AtomicBool,
}

impl ControlPlaneClient {
    pub fn new(
        config: ControlPlaneConfig,
        identity: WorkerIdentity,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(AgentError::Http)?;

        let ip_address = config
            .advertise_ip
            .clone()
            .or_else(|| discover_local_ip(&config.base_url));

        Ok(Self {
            config,
            client,
            identity,
            credentials,
            ip_address,
            registered: AtomicBool::new(false),
        })
    }

    /// Whether the client has a control plane to talk to.
    ///
    /// Registration needs both a control-plane URL and an instance id;
    /// a dev agent without them runs collection and exposition only.
    pub fn enabled(&self) -> bool {
        !self.config.base_url.is_empty() && !self.identity.instance_id.is_empty()
    }

    /// Whether the first registration has succeeded. Monotonic.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Whether a heartbeat should be attempted this cycle.
    ///
    /// Without a credential and without a successful registration, a
    /// heartbeat would only produce unauthenticated noise; skip it.
    pub fn should_heartbeat(&self) -> bool {
        self.credentials.has_token() || self.is_registered()
    }

    /// Register this worker with the control plane.
    ///
    /// A 2xx response marks the client registered and may carry a
    /// bootstrap token, adopted only when no credential is held yet.
    pub async fn register(&self, snapshot: &Snapshot) -> Result<()> {
        let body = RegisterRequest {
            instance_id: self.identity.instance_id.clone(),
            worker_id: self.identity.worker_id.clone(),
            model_id: self.identity.model_id.clone(),
            vllm_port: self.config.runtime_port,
            health_port: self.config.health_port,
            ip_address: self.ip_address.clone(),
            metadata: build_metadata(snapshot),
        };

        let url = format!("{}/internal/worker/register", self.config.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = self.credentials.bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::ControlPlane(format!(
                "register failed: {} {}",
                status,
                truncate(&detail, 200)
            )));
        }

        // A 2xx with an unparseable body still registers; it just
        // carries no bootstrap token.
        let payload: RegisterResponse = response.json().await.unwrap_or_default();
        if let Some(token) = payload.bootstrap_token {
            self.credentials.adopt(&token);
        }

        self.registered.store(true, Ordering::SeqCst);
        info!("registered worker {} with control plane", self.identity.worker_id);
        Ok(())
    }

    /// Send a heartbeat carrying status and load summary.
    pub async fn heartbeat(&self, status: &str, snapshot: &Snapshot) -> Result<()> {
        let body = HeartbeatRequest {
            instance_id: self.identity.instance_id.clone(),
            worker_id: self.identity.worker_id.clone(),
            status: status.to_string(),
            model_id: self.identity.model_id.clone(),
            queue_depth: snapshot.queue_depth(),
            gpu_utilization: snapshot.gpu_utilization(),
            gpu_mem_used_mb: snapshot.gpu_mem_used_mb(),
            ip_address: self.ip_address.clone(),
            metadata: build_metadata(snapshot),
        };

        let url = format!("{}/internal/worker/heartbeat", self.config.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = self.credentials.bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let http_status = response.status();
        if !http_status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::ControlPlane(format!(
                "heartbeat failed: {} {}",
                http_status,
                truncate(&detail, 200)
            )));
        }

        debug!("heartbeat acknowledged status={}", status);
        Ok(())
    }
}

/// Assemble the metadata block shared by register and heartbeat calls:
/// flattened GPU aggregates, host metrics under `system`, runtime
/// signals under `vllm`.
fn build_metadata(snapshot: &Snapshot) -> serde_json::Value {
    let mut map = serde_json::Map::new();

    if let Some(gpu) = &snapshot.gpu {
        map.insert("gpu_utilization".to_string(), gpu.utilization_pct.into());
        map.insert("gpu_mem_used_mb".to_string(), gpu.mem_used_mb.into());
        map.insert("gpu_mem_total_mb".to_string(), gpu.mem_total_mb.into());
        if let Some(temp) = gpu.temp_c {
            map.insert("gpu_temp_c".to_string(), temp.into());
        }
        if let Some(power) = gpu.power_w {
            map.insert("gpu_power_w".to_string(), power.into());
        }
        if let Some(limit) = gpu.power_limit_w {
            map.insert("gpu_power_limit_w".to_string(), limit.into());
        }
        if let Ok(gpus) = serde_json::to_value(&gpu.gpus) {
            map.insert("gpus".to_string(), gpus);
        }
    }

    if let Ok(system) = serde_json::to_value(&snapshot.host) {
        map.insert("system".to_string(), system);
    }

    if !snapshot.service.is_empty() {
        if let Ok(vllm) = serde_json::to_value(&snapshot.service) {
            map.insert("vllm".to_string(), vllm);
        }
    }

    serde_json::Value::Object(map)
}

/// Best-effort local IP discovery.
///
/// A UDP connect toward the control-plane host lets the kernel pick
/// the outbound interface without sending a packet. When that fails,
/// resolving the machine's own hostname is the second chance. Loopback
/// answers are rejected either way.
fn discover_local_ip(control_plane_url: &str) -> Option<String> {
    probe_outbound_ip(control_plane_url).or_else(hostname_ip)
}

fn probe_outbound_ip(control_plane_url: &str) -> Option<String> {
    let (host, port) = host_and_port(control_plane_url)?;

    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect((host.as_str(), port)).ok()?;
    let ip = socket.local_addr().ok()?.ip();

    if ip.is_loopback() {
        None
    } else {
        Some(ip.to_string())
    }
}

fn hostname_ip() -> Option<String> {
    let hostname = nix::unistd::gethostname().ok()?;
    let hostname = hostname.to_str()?;

    (hostname, 0u16)
        .to_socket_addrs()
        .ok()?
        .map(|addr| addr.ip())
        .find(|ip| !ip.is_loopback())
        .map(|ip| ip.to_string())
}

/// Extract `(host, port)` from an `http(s)://host[:port][/path]` URL.
/// IPv6 literal authorities carry brackets: `http://[::1]:9000`.
fn host_and_port(url: &str) -> Option<(String, u16)> {
    let (default_port, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (443, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (80, rest)
    } else {
        return None;
    };

    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        return None;
    }

    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed.split_once(']')?;
        if host.is_empty() {
            return None;
        }
        let port = match after.strip_prefix(':') {
            Some(port) => port.parse().ok()?,
            None if after.is_empty() => default_port,
            None => return None,
        };
        return Some((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            Some((host.to_string(), port))
        }
        None => Some((authority.to_string(), default_port)),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
