//! Raw metric snapshot types and the calculations defined on them.
//!
//! A [`Metrics`] value is one point-in-time reading of a cgroup's counters,
//! produced by a metrics source such as [`super::Collector`]. The functions
//! here only read snapshots; deriving rates and percentages from successive
//! snapshots lives in [`crate::stats`].

/// Sentinel the kernel uses for "no limit configured".
pub const UNLIMITED: u64 = u64::MAX;

/// Raw counters for one cgroup at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    pub memory: MemoryMetrics,
    pub cpu: CpuMetrics,
    pub io: IoMetrics,
    pub pids: PidsMetrics,
}

/// Memory counters from `memory.current`, `memory.stat` and `memory.max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMetrics {
    /// Current memory usage in bytes.
    pub usage: u64,
    /// Inactive file-backed cache in bytes.
    pub inactive_file: u64,
    /// Usage limit in bytes; [`UNLIMITED`] when no limit is configured.
    pub usage_limit: u64,
}

impl Default for MemoryMetrics {
    fn default() -> Self {
        Self {
            usage: 0,
            inactive_file: 0,
            usage_limit: UNLIMITED,
        }
    }
}

/// Cumulative CPU time from `cpu.stat`, in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuMetrics {
    /// Total CPU time consumed by the cgroup.
    pub usage_usec: u64,
    /// CPU time spent in kernel space.
    pub system_usec: u64,
}

/// Per-device block I/O counters from `io.stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoMetrics {
    pub usage: Vec<IoEntry>,
}

/// Counters for a single block device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoEntry {
    pub major: u64,
    pub minor: u64,
    /// Bytes read.
    pub rbytes: u64,
    /// Bytes written.
    pub wbytes: u64,
    /// Read operations.
    pub rios: u64,
    /// Write operations.
    pub wios: u64,
}

/// Pid count from `pids.current`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PidsMetrics {
    pub current: u64,
}

/// Returns the working-set memory usage: total usage minus inactive file
/// cache, clamped so a briefly larger cache never yields a negative value.
pub fn calculate_mem_usage(metrics: &Metrics) -> f64 {
    let usage = metrics.memory.usage;
    let inactive_file = metrics.memory.inactive_file;

    if inactive_file < usage {
        (usage - inactive_file) as f64
    } else {
        usage as f64
    }
}

/// Sums read and write bytes across devices, skipping devices with no
/// operations this interval. Bytes count only on the side whose operation
/// counter is non-zero.
pub fn calculate_io(metrics: &Metrics) -> (u64, u64) {
    let mut io_read = 0;
    let mut io_write = 0;

    for entry in &metrics.io.usage {
        if entry.rios == 0 && entry.wios == 0 {
            continue;
        }

        if entry.rios != 0 {
            io_read += entry.rbytes;
        }

        if entry.wios != 0 {
            io_write += entry.wbytes;
        }
    }

    (io_read, io_write)
}
