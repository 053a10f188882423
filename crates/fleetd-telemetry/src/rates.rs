//! Counter-to-rate conversion
//!
//! CPU ticks and network byte counters are absolute values; a usable
//! metric needs the delta between two observations. [`RateTracker`]
//! owns the previous observation for each counter type behind a single
//! lock, so the driver loop and concurrent scrapes serialize instead of
//! racing on shared slots.

use crate::host::{CpuCounters, NetCounters};
use std::sync::Mutex;
use std::time::Instant;

/// Stateful rate calculator.
///
/// Each `observe_*` call computes the rate against the previous
/// observation, then unconditionally overwrites the slot with the
/// current one. The first observation of a counter type yields `None`:
/// a rate without a window is omitted, never reported as zero.
#[derive(Debug, Default)]
pub struct RateTracker {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    prev_cpu: Option<CpuCounters>,
    prev_net: Option<NetObservation>,
}

#[derive(Debug, Clone, Copy)]
struct NetObservation {
    counters: NetCounters,
    at: Instant,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a CPU counter observation, returning the usage percentage
    /// over the window since the previous one, clamped to `[0, 100]`.
    ///
    /// `None` on the first observation, or when the counters did not
    /// advance (including counter resets going backwards).
    pub fn observe_cpu(&self, current: CpuCounters) -> Option<f64> {
        let mut inner = self.inner.lock().expect("rate tracker lock poisoned");
        let prev = inner.prev_cpu.replace(current)?;

        if current.total <= prev.total {
            return None;
        }

        let delta_total = (current.total - prev.total) as f64;
        let delta_idle = current.idle.saturating_sub(prev.idle) as f64;
        let usage = (1.0 - delta_idle / delta_total) * 100.0;

        Some(usage.clamp(0.0, 100.0))
    }

    /// Record a network counter observation, returning `(rx_bps,
    /// tx_bps)` over the elapsed wall time since the previous one.
    pub fn observe_net(&self, current: NetCounters) -> Option<(f64, f64)> {
        self.observe_net_at(current, Instant::now())
    }

    /// As [`observe_net`](Self::observe_net), with an explicit
    /// observation time for tests.
    pub fn observe_net_at(&self, current: NetCounters, at: Instant) -> Option<(f64, f64)> {
        let mut inner = self.inner.lock().expect("rate tracker lock poisoned");
        let prev = inner.prev_net.replace(NetObservation {
            counters: current,
            at,
        })?;

        let elapsed = at.checked_duration_since(prev.at)?.as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        let rx = current.rx_bytes.saturating_sub(prev.counters.rx_bytes) as f64 / elapsed;
        let tx = current.tx_bytes.saturating_sub(prev.counters.tx_bytes) as f64 / elapsed;

        Some((rx.max(0.0), tx.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cpu(total: u64, idle: u64) -> CpuCounters {
        CpuCounters { total, idle }
    }

    fn net(rx: u64, tx: u64) -> NetCounters {
        NetCounters {
            rx_bytes: rx,
            tx_bytes: tx,
        }
    }

    #[test]
    fn test_first_cpu_observation_is_omitted() {
        let tracker = RateTracker::new();
        assert!(tracker.observe_cpu(cpu(100, 50)).is_none());
    }

    #[test]
    fn test_cpu_usage_scenario() {
        let tracker = RateTracker::new();
        tracker.observe_cpu(cpu(100, 50));
        // delta total = 100, delta idle = 50 -> 50% busy
        assert_eq!(tracker.observe_cpu(cpu(200, 100)), Some(50.0));
    }

    #[test]
    fn test_cpu_usage_stays_in_bounds() {
        let tracker = RateTracker::new();
        tracker.observe_cpu(cpu(100, 50));

        // Idle advanced more than total (jittery counters): clamp to 0.
        let usage = tracker.observe_cpu(cpu(110, 80)).unwrap();
        assert_eq!(usage, 0.0);

        // Fully busy window.
        let usage = tracker.observe_cpu(cpu(210, 80)).unwrap();
        assert_eq!(usage, 100.0);
    }

    #[test]
    fn test_cpu_counter_reset_is_omitted_then_recovers() {
        let tracker = RateTracker::new();
        tracker.observe_cpu(cpu(1000, 500));

        // Counters went backwards (reboot / namespace switch).
        assert!(tracker.observe_cpu(cpu(100, 50)).is_none());

        // The reset sample became the new baseline.
        assert_eq!(tracker.observe_cpu(cpu(200, 100)), Some(50.0));
    }

    #[test]
    fn test_first_net_observation_is_omitted() {
        let tracker = RateTracker::new();
        assert!(tracker.observe_net_at(net(1000, 2000), Instant::now()).is_none());
    }

    #[test]
    fn test_net_rates() {
        let tracker = RateTracker::new();
        let start = Instant::now();

        tracker.observe_net_at(net(1000, 2000), start);
        let (rx, tx) = tracker
            .observe_net_at(net(3000, 2500), start + Duration::from_secs(2))
            .unwrap();

        assert_eq!(rx, 1000.0);
        assert_eq!(tx, 250.0);
    }

    #[test]
    fn test_net_non_positive_elapsed_is_omitted() {
        let tracker = RateTracker::new();
        let start = Instant::now();

        tracker.observe_net_at(net(1000, 2000), start + Duration::from_secs(1));
        // Observation timestamped before the previous one.
        assert!(tracker.observe_net_at(net(2000, 3000), start).is_none());
    }

    #[test]
    fn test_net_counter_reset_clamps_to_zero() {
        let tracker = RateTracker::new();
        let start = Instant::now();

        tracker.observe_net_at(net(5000, 5000), start);
        let (rx, tx) = tracker
            .observe_net_at(net(100, 100), start + Duration::from_secs(1))
            .unwrap();

        assert_eq!(rx, 0.0);
        assert_eq!(tx, 0.0);
    }
}
