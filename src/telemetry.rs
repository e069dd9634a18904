use std::sync::Mutex;

use crate::models::SystemStats;

/// read-only source of host resource usage
pub trait HostTelemetry: Send + Sync {
    fn sample(&self) -> SystemStats;
}

/// samples `/proc/stat` and `/proc/meminfo`, reports zeros where they are unavailable
///
/// cpu usage is the busy share since the previous sample, so the first call
/// reports the average since boot.
#[derive(Default)]
pub struct ProcTelemetry {
    previous: Mutex<Option<CpuTimes>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

impl ProcTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn cpu_percent(&self) -> f64 {
        let Some(current) = std::fs::read_to_string("/proc/stat")
            .ok()
            .as_deref()
            .and_then(parse_cpu_times)
        else {
            return 0.0;
        };

        let mut previous = self
            .previous
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let baseline = previous.replace(current).unwrap_or(CpuTimes { idle: 0, total: 0 });
        busy_percent(baseline, current)
    }

    fn ram_percent(&self) -> f64 {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .as_deref()
            .and_then(parse_mem_percent)
            .unwrap_or(0.0)
    }
}

impl HostTelemetry for ProcTelemetry {
    fn sample(&self) -> SystemStats {
        SystemStats {
            cpu_percent: self.cpu_percent(),
            ram_percent: self.ram_percent(),
        }
    }
}

/// aggregate `cpu` line of `/proc/stat`
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }

    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total = fields.iter().sum();
    Some(CpuTimes { idle, total })
}

pub fn busy_percent(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    if total == 0 {
        return 0.0;
    }
    let idle = after.idle.saturating_sub(before.idle);
    (total.saturating_sub(idle)) as f64 / total as f64 * 100.0
}

/// used memory share from `/proc/meminfo`, based on `MemAvailable`
pub fn parse_mem_percent(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };

    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some(total.saturating_sub(available) as f64 / total as f64 * 100.0)
}
