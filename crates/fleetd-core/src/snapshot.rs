//! Point-in-time metric snapshot data model
//!
//! A snapshot is assembled fresh on every collection cycle and every
//! scrape. Every field is optional: a source that could not be read
//! leaves its fields absent rather than reporting zeros.

use serde::{Deserialize, Serialize};

/// Host-level metrics read from `/proc` and `statvfs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostMetrics {
    /// Load averages from /proc/loadavg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load5: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load15: Option<f64>,

    /// Memory from /proc/meminfo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_available_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_used_pct: Option<f64>,

    /// Disk usage for the configured path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_free_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_used_pct: Option<f64>,

    /// CPU usage percent, absent on the first collection cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_pct: Option<f64>,

    /// Network throughput, absent on the first collection cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_rx_bps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_tx_bps: Option<f64>,

    /// Absolute network counters (non-loopback interfaces summed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_rx_bytes_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_tx_bytes_total: Option<u64>,
}

impl HostMetrics {
    /// Fill in derived convenience fields.
    ///
    /// Each derivation only happens when both inputs are present and
    /// the denominator is positive; percentages are clamped to
    /// `[0, 100]`.
    pub fn compute_derived(&mut self) {
        if let (Some(total), Some(available)) = (self.mem_total_bytes, self.mem_available_bytes) {
            if total > 0 {
                let used = total.saturating_sub(available);
                self.mem_used_bytes = Some(used);
                self.mem_used_pct = Some(clamp_pct(used as f64 / total as f64 * 100.0));
            }
        }

        if let (Some(total), Some(used)) = (self.disk_total_bytes, self.disk_used_bytes) {
            if total > 0 {
                self.disk_used_pct = Some(clamp_pct(used as f64 / total as f64 * 100.0));
            }
        }
    }
}

/// Telemetry for one physical or simulated GPU.
///
/// The serde names are the per-GPU keys the control plane already
/// stores in worker metadata; they stay `gpu_`-prefixed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSample {
    pub index: u32,
    #[serde(rename = "gpu_utilization")]
    pub utilization_pct: f64,
    #[serde(rename = "gpu_mem_used_mb")]
    pub mem_used_mb: f64,
    #[serde(rename = "gpu_mem_total_mb")]
    pub mem_total_mb: f64,
    #[serde(rename = "gpu_temp_c", skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f64>,
    #[serde(rename = "gpu_power_w", skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    #[serde(rename = "gpu_power_limit_w", skip_serializing_if = "Option::is_none")]
    pub power_limit_w: Option<f64>,
}

/// Per-GPU samples plus fleet-level aggregates.
///
/// The aggregates mirror what the control plane balances on: mean
/// utilization across GPUs, memory summed over the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuReport {
    pub utilization_pct: f64,
    pub mem_used_mb: f64,
    pub mem_total_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_limit_w: Option<f64>,
    pub gpus: Vec<GpuSample>,
}

impl GpuReport {
    /// Aggregate per-GPU samples into a report. Returns `None` for an
    /// empty sample set.
    pub fn aggregate(gpus: Vec<GpuSample>) -> Option<Self> {
        if gpus.is_empty() {
            return None;
        }

        let count = gpus.len() as f64;
        let utilization_pct = gpus.iter().map(|g| g.utilization_pct).sum::<f64>() / count;
        let mem_used_mb = gpus.iter().map(|g| g.mem_used_mb).sum();
        let mem_total_mb = gpus.iter().map(|g| g.mem_total_mb).sum();

        Some(Self {
            utilization_pct,
            mem_used_mb,
            mem_total_mb,
            temp_c: mean_present(gpus.iter().map(|g| g.temp_c)),
            power_w: mean_present(gpus.iter().map(|g| g.power_w)),
            power_limit_w: mean_present(gpus.iter().map(|g| g.power_limit_w)),
            gpus,
        })
    }
}

/// Load signals scraped from the inference runtime's own exposition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSignal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_waiting: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_running: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u64>,
}

impl ServiceSignal {
    pub fn is_empty(&self) -> bool {
        self.requests_waiting.is_none()
            && self.requests_running.is_none()
            && self.queue_depth.is_none()
    }
}

/// One full, possibly partial, point-in-time collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub host: HostMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuReport>,
    pub service: ServiceSignal,
}

impl Snapshot {
    /// Queue depth summary used in heartbeats.
    pub fn queue_depth(&self) -> Option<u64> {
        self.service.queue_depth
    }

    /// Aggregate GPU utilization summary used in heartbeats.
    pub fn gpu_utilization(&self) -> Option<f64> {
        self.gpu.as_ref().map(|g| g.utilization_pct)
    }

    /// Aggregate GPU memory-used summary used in heartbeats.
    pub fn gpu_mem_used_mb(&self) -> Option<f64> {
        self.gpu.as_ref().map(|g| g.mem_used_mb)
    }
}

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn mean_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.flatten().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}
