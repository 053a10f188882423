//! Snapshot collection
//!
//! The collector is the aggregation point: it invokes every sample
//! source, feeds the absolute counters through the shared rate tracker,
//! and merges the results into one [`Snapshot`]. Each source degrades
//! independently; a failed reading leaves its fields absent.

use fleetd_core::{HostMetrics, Snapshot};
use fleetd_runtime::RuntimeClient;
use fleetd_telemetry::{host, GpuSampler, RateTracker};
use std::sync::Arc;
use tracing::{debug, warn};

/// Aggregates sample sources into snapshots.
///
/// Shared by the driver loop and the exposition server; the only
/// mutable state involved is the rate tracker, which serializes
/// concurrent collections internally.
pub struct MetricsCollector {
    disk_path: String,
    rates: Arc<RateTracker>,
    gpu: GpuSampler,
    runtime: Arc<RuntimeClient>,
}

impl MetricsCollector {
    pub fn new(
        disk_path: String,
        rates: Arc<RateTracker>,
        gpu: GpuSampler,
        runtime: Arc<RuntimeClient>,
    ) -> Self {
        Self {
            disk_path,
            rates,
            gpu,
            runtime,
        }
    }

    /// Collect a fresh snapshot from all sources.
    pub async fn collect(&self) -> Snapshot {
        let service = self.runtime.scrape_signals().await;
        let mut host_metrics = HostMetrics::default();

        match host::read_loadavg() {
            Ok(load) => {
                host_metrics.load1 = Some(load.load1);
                host_metrics.load5 = Some(load.load5);
                host_metrics.load15 = Some(load.load15);
            }
            Err(e) => debug!("loadavg unavailable: {}", e),
        }

        match host::read_meminfo() {
            Ok(mem) => {
                host_metrics.mem_total_bytes = mem.total_bytes;
                host_metrics.mem_available_bytes = mem.available_bytes;
            }
            Err(e) => debug!("meminfo unavailable: {}", e),
        }

        match host::read_disk_usage(&self.disk_path) {
            Ok(disk) => {
                host_metrics.disk_path = Some(disk.path);
                host_metrics.disk_total_bytes = Some(disk.total_bytes);
                host_metrics.disk_used_bytes = Some(disk.used_bytes);
                host_metrics.disk_free_bytes = Some(disk.free_bytes);
            }
            Err(e) => debug!("disk usage unavailable: {}", e),
        }

        match host::read_cpu_counters() {
            Ok(counters) => {
                host_metrics.cpu_usage_pct = self.rates.observe_cpu(counters);
            }
            Err(e) => debug!("cpu counters unavailable: {}", e),
        }

        match host::read_net_counters() {
            Ok(counters) => {
                host_metrics.net_rx_bytes_total = Some(counters.rx_bytes);
                host_metrics.net_tx_bytes_total = Some(counters.tx_bytes);
                if let Some((rx_bps, tx_bps)) = self.rates.observe_net(counters) {
                    host_metrics.net_rx_bps = Some(rx_bps);
                    host_metrics.net_tx_bps = Some(tx_bps);
                }
            }
            Err(e) => debug!("net counters unavailable: {}", e),
        }

        host_metrics.compute_derived();

        let gpu = match self.gpu.sample(service.queue_depth).await {
            Ok(report) => Some(report),
            Err(e) if e.is_unavailable() => {
                debug!("gpu telemetry unavailable: {}", e);
                None
            }
            Err(e) => {
                warn!("gpu telemetry failed: {}", e);
                None
            }
        };

        Snapshot {
            host: host_metrics,
            gpu,
            service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetd_runtime::RuntimeClientConfig;
    use fleetd_telemetry::GpuSamplerConfig;
    use std::time::Duration;

    fn collector() -> MetricsCollector {
        // Runtime endpoint that refuses connections: service signals
        // must come back empty, not as errors.
        let runtime = RuntimeClient::new(RuntimeClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            metrics_url: "http://127.0.0.1:1/metrics".to_string(),
            model_id: None,
            timeout: Duration::from_millis(200),
        })
        .unwrap();

        MetricsCollector::new(
            "/".to_string(),
            Arc::new(RateTracker::new()),
            GpuSampler::new(GpuSamplerConfig {
                query_timeout: Duration::from_millis(200),
                ..GpuSamplerConfig::default()
            }),
            Arc::new(runtime),
        )
    }

    #[tokio::test]
    async fn test_collect_degrades_without_runtime() {
        let collector = collector();
        let snapshot = collector.collect().await;

        assert!(snapshot.service.is_empty());
        // Host sources exist on any Linux test machine.
        assert!(snapshot.host.mem_total_bytes.is_some());
        assert!(snapshot.host.load1.is_some());
        assert!(snapshot.host.disk_total_bytes.is_some());
    }

    #[tokio::test]
    async fn test_first_cycle_omits_rates_then_reports() {
        let collector = collector();

        let first = collector.collect().await;
        assert!(first.host.cpu_usage_pct.is_none());
        assert!(first.host.net_rx_bps.is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = collector.collect().await;
        if let Some(pct) = second.host.cpu_usage_pct {
            assert!((0.0..=100.0).contains(&pct));
        }
        if let Some(rx) = second.host.net_rx_bps {
            assert!(rx >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_simulated_gpu_appears_in_snapshot() {
        let runtime = RuntimeClient::new(RuntimeClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            metrics_url: "http://127.0.0.1:1/metrics".to_string(),
            model_id: None,
            timeout: Duration::from_millis(200),
        })
        .unwrap();

        let collector = MetricsCollector::new(
            "/".to_string(),
            Arc::new(RateTracker::new()),
            GpuSampler::new(GpuSamplerConfig {
                simulate_gpu_count: 1,
                simulate_gpu_vram_mb: 1000,
                query_timeout: Duration::from_millis(200),
            }),
            Arc::new(runtime),
        );

        let snapshot = collector.collect().await;
        let gpu = snapshot.gpu.expect("simulated gpu report");
        assert_eq!(gpu.gpus.len(), 1);
        assert_eq!(gpu.mem_total_mb, 1000.0);
    }
}
