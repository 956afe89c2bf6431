// src/tracker/sampler.rs
//! Process and host resource sampling
//!
//! Wraps a `sysinfo::System` so the tracker can take cheap point-in-time
//! readings of the current process (memory, CPU) and a host-wide snapshot
//! (uptime, memory, load average) for `get_stats`.

use chrono::Utc;
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::warn;

use crate::tracker::operation::ResourceSample;

/// Host-wide metrics merged into the process snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HostMetrics {
    pub uptime_secs: u64,
    pub load_average: [f64; 3],
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub process_memory_bytes: u64,
    pub process_cpu_percent: f32,
}

/// Point-in-time resource sampler for the current process
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = e, "cannot resolve current pid, samples will read zero");
                None
            }
        };
        Self { system, pid }
    }

    /// Memory and CPU of the current process right now
    ///
    /// CPU percentages are deltas between consecutive refreshes, so the
    /// first reading after construction reports 0.
    pub fn sample(&mut self) -> ResourceSample {
        let (memory_bytes, cpu_percent) = self.refresh_process();
        ResourceSample {
            timestamp: Utc::now(),
            memory_bytes,
            cpu_percent,
        }
    }

    /// Host-wide snapshot including the current process figures
    pub fn host_metrics(&mut self) -> HostMetrics {
        self.system.refresh_memory();
        let (process_memory_bytes, process_cpu_percent) = self.refresh_process();
        let load = System::load_average();
        HostMetrics {
            uptime_secs: System::uptime(),
            load_average: [load.one, load.five, load.fifteen],
            total_memory_bytes: self.system.total_memory(),
            used_memory_bytes: self.system.used_memory(),
            process_memory_bytes,
            process_cpu_percent,
        }
    }

    fn refresh_process(&mut self) -> (u64, f32) {
        let Some(pid) = self.pid else {
            return (0, 0.0);
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match self.system.process(pid) {
            Some(process) => (process.memory(), process.cpu_usage()),
            None => (0, 0.0),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}
