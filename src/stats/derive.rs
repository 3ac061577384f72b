//! Turns one raw metrics snapshot into a derived [`Entry`].
//!
//! Pure computation over its inputs; the metrics source and the link
//! lister do the I/O beforehand. The only file touched here is the
//! host meminfo fallback for cgroups without a configured memory limit.

use std::io::BufRead;
use std::path::Path;

use crate::cgroup::{self, Metrics, UNLIMITED};
use crate::fsutil;
use crate::net::{self, LinkStats};

use super::{ContainerSample, Entry, NSEC_PER_USEC};

const PERCENT: f64 = 100.0;
const BYTES_PER_KIB: u64 = 1024;
const PROC_MEMINFO_PATH: &str = "/proc/meminfo";
const MEM_TOTAL_FIELD: &str = "MemTotal:";
const MEMORY_UNLIMITED: f64 = UNLIMITED as f64;

/// Derives the statistics entry for one sampling tick.
///
/// The caller is responsible for replacing its [`ContainerSample`] with
/// [`ContainerSample::from_metrics`] afterwards; the snapshot itself is
/// never mutated. The returned entry carries an empty id.
pub fn derive(previous: &ContainerSample, metrics: &Metrics, links: &[LinkStats]) -> Entry {
    let (network_rx, network_tx) = net::stats_for_links(links);
    let (block_read, block_write) = cgroup::calculate_io(metrics);
    let memory = cgroup::calculate_mem_usage(metrics);

    let mut memory_limit = metrics.memory.usage_limit as f64;
    if memory_limit == MEMORY_UNLIMITED {
        memory_limit = host_memory_limit();
    }

    let memory_percentage = calculate_mem_percent(memory_limit, memory);
    let cpu_percentage = calculate_cpu_percent(previous, metrics);

    Entry {
        id: String::new(),
        cpu_percentage,
        memory,
        memory_limit,
        memory_percentage,
        network_rx,
        network_tx,
        block_read: block_read as f64,
        block_write: block_write as f64,
        pids_current: metrics.pids.current,
        invalid: false,
    }
}

/// The limit is only ever 0 when the container is not running and no
/// cgroup data was available.
fn calculate_mem_percent(limit: f64, used: f64) -> f64 {
    if limit != 0.0 {
        return used / limit * PERCENT;
    }

    0.0
}

/// CPU usage over the interval since `previous`, as a percentage of a
/// single core. The legacy per-CPU-usage-array accounting of cgroup v1 is
/// not supported.
fn calculate_cpu_percent(previous: &ContainerSample, metrics: &Metrics) -> f64 {
    let cpu_delta = (metrics.cpu.usage_usec * NSEC_PER_USEC) as f64 - previous.cpu_nsec as f64;
    // The system-wide delta takes no part in the percentage; the result is
    // normalized against wall-clock time only.
    let _system_delta =
        (metrics.cpu.system_usec * NSEC_PER_USEC) as f64 - previous.system_nsec as f64;
    let time_delta = previous.time.elapsed();

    if cpu_delta > 0.0 {
        return cpu_delta / time_delta.as_nanos() as f64 * PERCENT;
    }

    0.0
}

/// Total physical memory of the host in bytes, used as the effective limit
/// for cgroups without one. An unreadable meminfo or a missing total field
/// yields the unlimited sentinel.
pub fn host_memory_limit() -> f64 {
    host_memory_limit_from(PROC_MEMINFO_PATH)
}

fn host_memory_limit_from(path: impl AsRef<Path>) -> f64 {
    match fsutil::open_file_reader(path) {
        Ok(mut buf) => host_memory_limit_from_reader(&mut buf),
        Err(_) => MEMORY_UNLIMITED,
    }
}

fn host_memory_limit_from_reader<R: BufRead>(buf: &mut R) -> f64 {
    let mut line = String::new();

    while let Ok(n) = buf.read_line(&mut line) {
        if n == 0 {
            break;
        }

        if let Some(rest) = line.strip_prefix(MEM_TOTAL_FIELD) {
            if let Some(field) = rest.split_whitespace().next() {
                if let Ok(mem_kib) = field.parse::<u64>() {
                    return (mem_kib * BYTES_PER_KIB) as f64;
                }
            }

            break;
        }

        line.clear();
    }

    MEMORY_UNLIMITED
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::cgroup::{CpuMetrics, IoEntry, IoMetrics, MemoryMetrics, PidsMetrics};

    use super::*;

    fn second_old_sample(cpu_nsec: u64, system_nsec: u64) -> ContainerSample {
        ContainerSample {
            time: Instant::now() - Duration::from_secs(1),
            cpu_nsec,
            system_nsec,
        }
    }

    fn metrics() -> Metrics {
        Metrics {
            memory: MemoryMetrics {
                usage: 100,
                inactive_file: 40,
                usage_limit: 1_000,
            },
            cpu: CpuMetrics {
                usage_usec: 500_000,
                system_usec: 900_000,
            },
            io: IoMetrics {
                usage: vec![IoEntry {
                    major: 8,
                    minor: 0,
                    rbytes: 1024,
                    wbytes: 2048,
                    rios: 2,
                    wios: 4,
                }],
            },
            pids: PidsMetrics { current: 7 },
        }
    }

    #[test]
    fn test_derive_memory_fields() {
        let entry = derive(&ContainerSample::start(), &metrics(), &[]);
        assert_eq!(entry.memory, 60.0);
        assert_eq!(entry.memory_limit, 1_000.0);
        assert_eq!(entry.memory_percentage, 6.0);
    }

    #[test]
    fn test_derive_memory_usage_clamps_inactive_file() {
        let mut m = metrics();
        m.memory.usage = 100;
        m.memory.inactive_file = 150;
        let entry = derive(&ContainerSample::start(), &m, &[]);
        assert_eq!(entry.memory, 100.0);
    }

    #[test]
    fn test_derive_zero_limit_yields_zero_percent() {
        let mut m = metrics();
        m.memory.usage_limit = 0;
        let entry = derive(&ContainerSample::start(), &m, &[]);
        assert_eq!(entry.memory_limit, 0.0);
        assert_eq!(entry.memory_percentage, 0.0);
    }

    #[test]
    fn test_derive_unlimited_limit_substitutes_host_memory() {
        let mut m = metrics();
        m.memory.usage_limit = UNLIMITED;
        let entry = derive(&ContainerSample::start(), &m, &[]);
        assert_eq!(entry.memory_limit, host_memory_limit());
    }

    #[test]
    fn test_derive_block_io_and_pids() {
        let entry = derive(&ContainerSample::start(), &metrics(), &[]);
        assert_eq!(entry.block_read, 1024.0);
        assert_eq!(entry.block_write, 2048.0);
        assert_eq!(entry.pids_current, 7);
    }

    #[test]
    fn test_derive_idle_device_contributes_nothing() {
        let mut m = metrics();
        m.io.usage = vec![IoEntry {
            major: 8,
            minor: 0,
            rbytes: 4096,
            wbytes: 4096,
            rios: 0,
            wios: 0,
        }];
        let entry = derive(&ContainerSample::start(), &m, &[]);
        assert_eq!(entry.block_read, 0.0);
        assert_eq!(entry.block_write, 0.0);
    }

    #[test]
    fn test_derive_sums_network_links() {
        let links = vec![
            LinkStats {
                name: "eth0".to_owned(),
                rx_bytes: 100,
                tx_bytes: 200,
            },
            LinkStats {
                name: "eth1".to_owned(),
                rx_bytes: 10,
                tx_bytes: 20,
            },
        ];
        let entry = derive(&ContainerSample::start(), &metrics(), &links);
        assert_eq!(entry.network_rx, 110.0);
        assert_eq!(entry.network_tx, 220.0);
    }

    #[test]
    fn test_cpu_percent_positive_delta() {
        // 500_000 usec of CPU time over roughly one second of wall clock.
        let percent = calculate_cpu_percent(&second_old_sample(0, 0), &metrics());
        assert!(percent > 40.0 && percent < 51.0, "got {percent}");
    }

    #[test]
    fn test_cpu_percent_zero_delta_is_zero() {
        let previous = second_old_sample(500_000 * 1_000, 0);
        assert_eq!(calculate_cpu_percent(&previous, &metrics()), 0.0);
    }

    #[test]
    fn test_cpu_percent_counter_reset_is_zero_not_negative() {
        let previous = second_old_sample(900_000 * 1_000, 0);
        assert_eq!(calculate_cpu_percent(&previous, &metrics()), 0.0);
    }

    #[test]
    fn test_cpu_percent_ignores_system_wide_delta() {
        // Known characteristic: only the container delta over wall clock
        // enters the percentage, never the system-wide delta.
        let p1 = calculate_cpu_percent(&second_old_sample(0, 0), &metrics());
        let p2 = calculate_cpu_percent(&second_old_sample(0, 800_000_000_000), &metrics());
        assert!((p1 - p2).abs() < 0.5, "got {p1} vs {p2}");
    }

    #[test]
    fn test_host_memory_limit_parses_mem_total() {
        let data = "\
MemTotal:       16384 kB
MemFree:         8192 kB
";
        assert_eq!(
            host_memory_limit_from_reader(&mut data.as_bytes()),
            16384.0 * 1024.0
        );
    }

    #[test]
    fn test_host_memory_limit_missing_field_is_sentinel() {
        let data = "MemFree: 8192 kB\n";
        assert_eq!(
            host_memory_limit_from_reader(&mut data.as_bytes()),
            MEMORY_UNLIMITED
        );
    }

    #[test]
    fn test_host_memory_limit_garbled_value_is_sentinel() {
        let data = "MemTotal: lots kB\n";
        assert_eq!(
            host_memory_limit_from_reader(&mut data.as_bytes()),
            MEMORY_UNLIMITED
        );
    }

    #[test]
    fn test_host_memory_limit_unreadable_file_is_sentinel() {
        assert_eq!(
            host_memory_limit_from("/definitely/does/not/exist"),
            MEMORY_UNLIMITED
        );
    }

    #[test]
    fn test_derive_leaves_snapshot_untouched() {
        let m = metrics();
        let copy = m.clone();
        let _ = derive(&ContainerSample::start(), &m, &[]);
        assert_eq!(m, copy);
    }
}
