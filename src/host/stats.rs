//! Process statistics sampled into health snapshots.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Resident set size in bytes.
    pub rss: u64,
    pub virtual_memory: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    pub host_name: String,
    #[serde(rename = "processID")]
    pub process_id: u32,
    pub architecture: String,
    pub platform: String,
    pub memory: MemoryUsage,
    pub uptime_seconds: u64,
}

pub trait StatsCollector: Send + Sync {
    fn collect(&self) -> ProcessStats;
}

/// `StatsCollector` backed by the operating system's process table.
#[derive(Debug)]
pub struct SystemStats {
    started: Instant,
}

impl SystemStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector for SystemStats {
    fn collect(&self) -> ProcessStats {
        let pid = std::process::id();
        let mut system = System::new();
        let sys_pid = Pid::from_u32(pid);
        system.refresh_process(sys_pid);

        let (memory, uptime_seconds) = match system.process(sys_pid) {
            Some(process) => (
                MemoryUsage {
                    rss: process.memory(),
                    virtual_memory: process.virtual_memory(),
                },
                process.run_time(),
            ),
            None => (MemoryUsage::default(), self.started.elapsed().as_secs()),
        };

        ProcessStats {
            host_name: system.host_name().unwrap_or_default(),
            process_id: pid,
            architecture: std::env::consts::ARCH.to_string(),
            platform: std::env::consts::OS.to_string(),
            memory,
            uptime_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_reports_current_process() {
        let stats = SystemStats::new().collect();

        assert_eq!(stats.process_id, std::process::id());
        assert_eq!(stats.architecture, std::env::consts::ARCH);
        assert_eq!(stats.platform, std::env::consts::OS);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = ProcessStats {
            host_name: "box".to_string(),
            process_id: 42,
            ..ProcessStats::default()
        };

        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["hostName"], "box");
        assert_eq!(json["processID"], 42);
        assert_eq!(json["memory"]["virtualMemory"], 0);
        assert!(json.get("uptimeSeconds").is_some());
    }
}
