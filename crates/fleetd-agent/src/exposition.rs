//! Local HTTP server for health checks and metrics exposition
//!
//! Serves `/healthz`, `/readyz`, `/metrics`, `/info` and `/events`.
//! Readiness and metrics are evaluated live on every request, so a
//! scrape always reflects the current state of the sources rather than
//! the last driver-loop cycle.

use crate::collector::MetricsCollector;
use crate::events::EventLog;
use crate::{AgentError, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fleetd_core::{Snapshot, WorkerIdentity};
use fleetd_runtime::{Readiness, RuntimeClient};
use prometheus::{Gauge, GaugeVec, IntGauge, Opts, Registry, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state behind the HTTP handlers.
pub struct ExpositionState {
    pub collector: Arc<MetricsCollector>,
    pub runtime: Arc<RuntimeClient>,
    pub identity: WorkerIdentity,
    pub events: Arc<EventLog>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// HTTP server exposing health and metrics for this worker.
pub struct ExpositionServer {
    state: Arc<ExpositionState>,
    bind_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ExpositionServer {
    pub fn new(state: Arc<ExpositionState>, bind_addr: SocketAddr) -> Self {
        Self {
            state,
            bind_addr,
            local_addr: None,
            server_handle: None,
        }
    }

    /// Start the HTTP server.
    pub async fn start(&mut self) -> Result<()> {
        if self.server_handle.is_some() {
            return Err(AgentError::Service("Server already started".to_string()));
        }

        let app = create_app(self.state.clone());
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.local_addr = Some(listener.local_addr()?);

        info!("exposition server listening on {}", self.local_addr.unwrap_or(self.bind_addr));

        let server_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("exposition server error: {}", e);
            }
        });

        self.server_handle = Some(server_handle);
        Ok(())
    }

    /// Stop the HTTP server.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// The bound address, available after `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.server_handle.is_some()
    }
}

impl Drop for ExpositionServer {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

fn create_app(state: Arc<ExpositionState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/info", get(info_handler))
        .route("/events", get(events_handler))
        .with_state(state)
}

async fn healthz_handler() -> Response {
    (StatusCode::OK, "ok\n").into_response()
}

async fn readyz_handler(State(state): State<Arc<ExpositionState>>) -> Response {
    if state.runtime.check_ready().await.is_ready() {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not-ready\n").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<ExpositionState>>) -> Response {
    let readiness = state.runtime.check_ready().await;
    let snapshot = state.collector.collect().await;

    match render_metrics(readiness, &snapshot) {
        Ok(body) => (StatusCode::OK, [("content-type", TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!("failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}

async fn info_handler(State(state): State<Arc<ExpositionState>>) -> Response {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "worker_id": state.identity.worker_id,
        "instance_id": state.identity.instance_id,
        "model_id": state.identity.model_id,
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
    }))
    .into_response()
}

async fn events_handler(State(state): State<Arc<ExpositionState>>) -> Response {
    let mut body = state.events.all().join("\n");
    body.push('\n');
    (StatusCode::OK, body).into_response()
}

/// Render a snapshot into Prometheus text format.
///
/// A fresh registry is built per scrape and only the families whose
/// values are actually known are registered; a source that failed this
/// cycle is absent from the output, never a zero.
pub fn render_metrics(readiness: Readiness, snapshot: &Snapshot) -> Result<String> {
    let registry = Registry::new();

    gauge(&registry, "fleetd_worker_up", "Worker process is up (always 1).", 1.0)?;
    gauge(
        &registry,
        "fleetd_worker_runtime_ready",
        "Inference runtime is ready to serve (1/0).",
        if readiness.is_ready() { 1.0 } else { 0.0 },
    )?;

    if let Some(depth) = snapshot.service.queue_depth {
        int_gauge(
            &registry,
            "fleetd_worker_queue_depth",
            "Best-effort queue depth (requests waiting).",
            depth as i64,
        )?;
    }
    if let Some(running) = snapshot.service.requests_running {
        gauge(
            &registry,
            "fleetd_worker_requests_running",
            "Best-effort running requests.",
            running,
        )?;
    }
    if let Some(waiting) = snapshot.service.requests_waiting {
        gauge(
            &registry,
            "fleetd_worker_requests_waiting",
            "Best-effort waiting requests.",
            waiting,
        )?;
    }

    if let Some(gpu) = &snapshot.gpu {
        gauge(
            &registry,
            "fleetd_worker_gpu_utilization",
            "GPU utilization percent, mean over GPUs.",
            gpu.utilization_pct,
        )?;
        gauge(
            &registry,
            "fleetd_worker_gpu_mem_used_mb",
            "GPU memory used MB, summed over GPUs.",
            gpu.mem_used_mb,
        )?;
        gauge(
            &registry,
            "fleetd_worker_gpu_mem_total_mb",
            "GPU memory total MB, summed over GPUs.",
            gpu.mem_total_mb,
        )?;

        let util_by_gpu = GaugeVec::new(
            Opts::new(
                "fleetd_worker_gpu_utilization_by_gpu",
                "GPU utilization percent by GPU index.",
            ),
            &["gpu_index"],
        )?;
        let mem_by_gpu = GaugeVec::new(
            Opts::new(
                "fleetd_worker_gpu_mem_used_mb_by_gpu",
                "GPU memory used MB by GPU index.",
            ),
            &["gpu_index"],
        )?;
        for sample in &gpu.gpus {
            let index = sample.index.to_string();
            util_by_gpu
                .with_label_values(&[index.as_str()])
                .set(sample.utilization_pct);
            mem_by_gpu
                .with_label_values(&[index.as_str()])
                .set(sample.mem_used_mb);
        }
        registry.register(Box::new(util_by_gpu))?;
        registry.register(Box::new(mem_by_gpu))?;
    }

    let host = &snapshot.host;
    if let Some(cpu) = host.cpu_usage_pct {
        gauge(
            &registry,
            "fleetd_worker_cpu_usage_pct",
            "CPU usage percent (host/container).",
            cpu,
        )?;
    }
    if let Some(load1) = host.load1 {
        gauge(&registry, "fleetd_worker_load1", "Load average (1m).", load1)?;
    }
    if let Some(used) = host.mem_used_bytes {
        int_gauge(
            &registry,
            "fleetd_worker_mem_used_bytes",
            "Memory used bytes.",
            used as i64,
        )?;
    }
    if let Some(total) = host.mem_total_bytes {
        int_gauge(
            &registry,
            "fleetd_worker_mem_total_bytes",
            "Memory total bytes.",
            total as i64,
        )?;
    }
    if let Some(used) = host.disk_used_bytes {
        int_gauge(
            &registry,
            "fleetd_worker_disk_used_bytes",
            "Disk used bytes for the monitored path.",
            used as i64,
        )?;
    }
    if let Some(total) = host.disk_total_bytes {
        int_gauge(
            &registry,
            "fleetd_worker_disk_total_bytes",
            "Disk total bytes for the monitored path.",
            total as i64,
        )?;
    }
    if let Some(rx) = host.net_rx_bps {
        gauge(
            &registry,
            "fleetd_worker_net_rx_bps",
            "Network receive throughput, bytes per second.",
            rx,
        )?;
    }
    if let Some(tx) = host.net_tx_bps {
        gauge(
            &registry,
            "fleetd_worker_net_tx_bps",
            "Network transmit throughput, bytes per second.",
            tx,
        )?;
    }

    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&registry.gather())?)
}

fn gauge(registry: &Registry, name: &str, help: &str, value: f64) -> Result<()> {
    let gauge = Gauge::new(name, help)?;
    gauge.set(value);
    registry.register(Box::new(gauge))?;
    Ok(())
}

fn int_gauge(registry: &Registry, name: &str, help: &str, value: i64) -> Result<()> {
    let gauge = IntGauge::new(name, help)?;
    gauge.set(value);
    registry.register(Box::new(gauge))?;
    Ok(())
}
