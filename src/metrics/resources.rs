//! Process resource usage for the metrics endpoint

use serde::Serialize;

/// OS-level usage; fields are `None` where the platform gives no answer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub pid: u32,
    pub resident_memory_bytes: Option<u64>,
    pub threads: Option<u64>,
    pub open_fds: Option<u64>,
}

/// Source of process resource usage
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> ResourceUsage;
}

/// Reads `/proc/self` on Linux; reports only the pid elsewhere
#[derive(Debug, Default)]
pub struct ProcfsSampler;

impl ResourceSampler for ProcfsSampler {
    fn sample(&self) -> ResourceUsage {
        let mut usage = ResourceUsage {
            pid: std::process::id(),
            ..Default::default()
        };

        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let (rss, threads) = parse_status(&status);
            usage.resident_memory_bytes = rss;
            usage.threads = threads;
        }

        usage.open_fds = std::fs::read_dir("/proc/self/fd")
            .ok()
            .map(|entries| entries.count() as u64);

        usage
    }
}

/// Pull VmRSS (in bytes) and Threads out of `/proc/<pid>/status`
fn parse_status(status: &str) -> (Option<u64>, Option<u64>) {
    let mut rss = None;
    let mut threads = None;

    for line in status.lines() {
        if let Some(value) = line.strip_prefix("VmRSS:") {
            // "  12345 kB"
            rss = value
                .split_whitespace()
                .next()
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb * 1024);
        } else if let Some(value) = line.strip_prefix("Threads:") {
            threads = value.trim().parse().ok();
        }
    }

    (rss, threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let status = "Name:\tpdfx-server\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\nThreads:\t7\n";
        assert_eq!(parse_status(status), (Some(2048 * 1024), Some(7)));
        assert_eq!(parse_status("Name:\tx\n"), (None, None));
    }

    #[test]
    fn test_sampler_reports_pid() {
        let usage = ProcfsSampler.sample();
        assert_eq!(usage.pid, std::process::id());
        if cfg!(target_os = "linux") {
            assert!(usage.resident_memory_bytes.unwrap_or(0) > 0);
            assert!(usage.open_fds.unwrap_or(0) > 0);
        }
    }
}
