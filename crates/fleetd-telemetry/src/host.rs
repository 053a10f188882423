//! Host sample sources
//!
//! Raw readers for `/proc` counters and filesystem usage. Each reader
//! returns a populated structure or an error; parsing is split out so
//! tests run against fixture text.

use crate::{Result, TelemetryError};
use std::path::Path;

/// Absolute CPU tick counters from the aggregate `cpu` line of
/// `/proc/stat`. Only meaningful as deltas between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCounters {
    /// All ticks: idle + iowait + user + nice + system + irq + softirq + steal
    pub total: u64,
    /// Idle ticks, including iowait
    pub idle: u64,
}

/// Absolute network byte counters summed over non-loopback interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Memory readings from `/proc/meminfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryInfo {
    pub total_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
}

/// Load averages from `/proc/loadavg`.
#[derive(Debug, Clone, Copy)]
pub struct LoadAverage {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// Filesystem usage for one mount point.
#[derive(Debug, Clone)]
pub struct DiskUsage {
    pub path: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// Read CPU tick counters from `/proc/stat`.
pub fn read_cpu_counters() -> Result<CpuCounters> {
    let text = std::fs::read_to_string("/proc/stat")
        .map_err(|e| TelemetryError::Unavailable(format!("/proc/stat: {}", e)))?;
    parse_cpu_counters(&text)
}

/// Parse the aggregate `cpu ` line.
pub fn parse_cpu_counters(text: &str) -> Result<CpuCounters> {
    let line = text
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| TelemetryError::Parse("no aggregate cpu line in /proc/stat".to_string()))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map_while(|f| f.parse().ok())
        .collect();

    // cpu user nice system idle iowait irq softirq steal ...
    if fields.len() < 4 {
        return Err(TelemetryError::Parse(format!(
            "short cpu line in /proc/stat: {:?}",
            line
        )));
    }

    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    let idle_all = field(3) + field(4);
    let non_idle = field(0) + field(1) + field(2) + field(5) + field(6) + field(7);

    Ok(CpuCounters {
        total: idle_all + non_idle,
        idle: idle_all,
    })
}

/// Read memory totals from `/proc/meminfo`.
pub fn read_meminfo() -> Result<MemoryInfo> {
    let text = std::fs::read_to_string("/proc/meminfo")
        .map_err(|e| TelemetryError::Unavailable(format!("/proc/meminfo: {}", e)))?;
    parse_meminfo(&text)
}

/// Parse `MemTotal`/`MemAvailable` (kB values) into bytes.
pub fn parse_meminfo(text: &str) -> Result<MemoryInfo> {
    let mut info = MemoryInfo::default();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        let slot = match key.trim() {
            "MemTotal" => &mut info.total_bytes,
            "MemAvailable" => &mut info.available_bytes,
            _ => continue,
        };

        // Values are reported as "<n> kB".
        let mut parts = value.split_whitespace();
        if let (Some(amount), Some("kB")) = (parts.next(), parts.next()) {
            if let Ok(kb) = amount.parse::<u64>() {
                *slot = Some(kb * 1024);
            }
        }
    }

    if info.total_bytes.is_none() && info.available_bytes.is_none() {
        return Err(TelemetryError::Parse(
            "no recognized fields in /proc/meminfo".to_string(),
        ));
    }

    Ok(info)
}

/// Read load averages from `/proc/loadavg`.
pub fn read_loadavg() -> Result<LoadAverage> {
    let text = std::fs::read_to_string("/proc/loadavg")
        .map_err(|e| TelemetryError::Unavailable(format!("/proc/loadavg: {}", e)))?;
    parse_loadavg(&text)
}

/// Parse the three leading load-average fields.
pub fn parse_loadavg(text: &str) -> Result<LoadAverage> {
    let mut fields = text.split_whitespace();

    let mut next = || -> Result<f64> {
        fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| TelemetryError::Parse(format!("malformed /proc/loadavg: {:?}", text)))
    };

    Ok(LoadAverage {
        load1: next()?,
        load5: next()?,
        load15: next()?,
    })
}

/// Read network byte counters from `/proc/net/dev`.
pub fn read_net_counters() -> Result<NetCounters> {
    let text = std::fs::read_to_string("/proc/net/dev")
        .map_err(|e| TelemetryError::Unavailable(format!("/proc/net/dev: {}", e)))?;
    parse_net_counters(&text)
}

/// Sum rx/tx bytes over all interfaces except loopback.
pub fn parse_net_counters(text: &str) -> Result<NetCounters> {
    let mut rx_bytes = 0u64;
    let mut tx_bytes = 0u64;
    let mut seen = false;

    // Two header lines, then "iface: rx_bytes ... [8 fields] tx_bytes ...".
    for line in text.lines().skip(2) {
        let Some((iface, rest)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }

        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 16 {
            continue;
        }

        let (Ok(rx), Ok(tx)) = (fields[0].parse::<u64>(), fields[8].parse::<u64>()) else {
            continue;
        };

        rx_bytes += rx;
        tx_bytes += tx;
        seen = true;
    }

    if !seen {
        return Err(TelemetryError::Unavailable(
            "no non-loopback interfaces in /proc/net/dev".to_string(),
        ));
    }

    Ok(NetCounters { rx_bytes, tx_bytes })
}

/// Read filesystem usage for a path via `statvfs`.
pub fn read_disk_usage(path: &str) -> Result<DiskUsage> {
    let stat = nix::sys::statvfs::statvfs(Path::new(path))
        .map_err(|e| TelemetryError::Unavailable(format!("statvfs {}: {}", path, e)))?;

    let fragment = stat.fragment_size() as u64;
    let total_bytes = stat.blocks() as u64 * fragment;
    let free_bytes = stat.blocks_available() as u64 * fragment;
    let used_bytes = total_bytes.saturating_sub(stat.blocks_free() as u64 * fragment);

    Ok(DiskUsage {
        path: path.to_string(),
        total_bytes,
        used_bytes,
        free_bytes,
    })
}
