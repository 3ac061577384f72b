//! Periodic sampling of monitored targets.
//!
//! A [`Monitor`] tracks any number of [`MonitoredTarget`]s, each pairing a
//! metrics collector with the [`Stats`] holder its consumers read from.
//! One sampling task drives [`Monitor::sample_all`] on a fixed interval;
//! the holders are written only after all file reads for a tick are done,
//! so their locks are never held across I/O. A failed tick routes its
//! error into the holder instead of removing the target; the next tick is
//! the retry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::cgroup::Collector;
use crate::error::ResultDegradeExt;
use crate::net;
use crate::stats::{self, ContainerSample, Stats};

/// One monitored container or process.
#[derive(Debug)]
pub struct MonitoredTarget {
    id: String,
    collector: Collector,
    previous: ContainerSample,
    netdev_path: PathBuf,
    stats: Arc<Stats>,
}

impl MonitoredTarget {
    /// Pairs a collector with the net-dev file of the given process.
    pub fn new(id: impl Into<String>, collector: Collector, pid: u32) -> Self {
        Self::with_netdev_path(id, collector, PathBuf::from(format!("/proc/{pid}/net/dev")))
    }

    pub fn with_netdev_path(
        id: impl Into<String>,
        collector: Collector,
        netdev_path: PathBuf,
    ) -> Self {
        let id = id.into();
        Self {
            stats: Arc::new(Stats::new(id.clone())),
            id,
            collector,
            previous: ContainerSample::start(),
            netdev_path,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The holder consumers read from, shared with the sampling loop.
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Runs one sampling tick: snapshot, link listing, derivation,
    /// publish. A failed snapshot resets the holder with a sticky error so
    /// stale values are never displayed; an unlistable net-dev file only
    /// degrades the network counters to zero.
    fn tick(&mut self) {
        let metrics = match self.collector.refresh() {
            Ok(metrics) => metrics,
            Err(err) => {
                log::error!(
                    target: "monitor",
                    "failed sampling tick: id={}, error={}",
                    self.id,
                    err
                );
                self.stats.set_error_and_reset(err);
                return;
            }
        };

        let links = net::links_for_path(&self.netdev_path)
            .ok_warn("listing network links")
            .unwrap_or_default();

        let mut entry = stats::derive(&self.previous, &metrics, &links);
        entry.id = self.id.clone();

        self.previous = ContainerSample::from_metrics(&metrics);
        self.stats.set(entry);
    }
}

/// Registry of monitored targets, keyed by id.
#[derive(Debug, Default)]
pub struct Monitor {
    targets: DashMap<String, MonitoredTarget>,
}

impl Monitor {
    pub fn register(&self, target: MonitoredTarget) {
        self.targets.insert(target.id.clone(), target);
    }

    pub fn remove(&self, id: &str) {
        self.targets.remove(id);
    }

    /// Returns the holder for a registered target.
    pub fn stats(&self, id: &str) -> Option<Arc<Stats>> {
        self.targets.get(id).map(|target| target.stats())
    }

    pub fn ids(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Runs one sampling tick for every registered target.
    pub fn sample_all(&self) {
        for mut entry in self.targets.iter_mut() {
            entry.value_mut().tick();
        }
    }
}

/// Drives the monitor on a fixed interval. The blocking file reads run on
/// the blocking pool.
pub async fn run(monitor: Arc<Monitor>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let monitor = Arc::clone(&monitor);
        let before = std::time::Instant::now();
        tokio::task::spawn_blocking(move || monitor.sample_all())
            .await
            .expect("spawn_blocking panicked");
        log::trace!("sample_all() took {} nanoseconds", before.elapsed().as_nanos());
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    const NETDEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
  eth0: 100 1 0 0 0 0 0 0  200 2 0 0 0 0 0 0
";

    fn write_cgroup_dir(dir: &Path) {
        fs::write(dir.join("cpu.stat"), "usage_usec 5000\nsystem_usec 2000\n").unwrap();
        fs::write(dir.join("memory.current"), "4096\n").unwrap();
        fs::write(dir.join("memory.stat"), "inactive_file 1024\n").unwrap();
        fs::write(dir.join("memory.max"), "8192\n").unwrap();
        fs::write(dir.join("pids.current"), "3\n").unwrap();
    }

    fn target_for(dir: &Path, id: &str) -> MonitoredTarget {
        let netdev_path = dir.join("netdev");
        fs::write(&netdev_path, NETDEV).unwrap();
        MonitoredTarget::with_netdev_path(id, Collector::for_cgroup_dir(dir), netdev_path)
    }

    #[test]
    fn test_sample_all_publishes_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_dir(dir.path());

        let monitor = Monitor::default();
        monitor.register(target_for(dir.path(), "target-a"));
        assert_eq!(monitor.len(), 1);

        monitor.sample_all();

        let stats = monitor.stats("target-a").unwrap();
        let entry = stats.get();
        assert_eq!(entry.id, "target-a");
        assert!(!entry.invalid);
        assert_eq!(entry.memory, 3072.0);
        assert_eq!(entry.memory_limit, 8192.0);
        assert_eq!(entry.network_rx, 100.0);
        assert_eq!(entry.network_tx, 200.0);
        assert_eq!(entry.pids_current, 3);
        assert!(stats.error().is_none());
    }

    #[test]
    fn test_failed_tick_resets_holder_with_sticky_error() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_dir(dir.path());

        let monitor = Monitor::default();
        monitor.register(target_for(dir.path(), "target-a"));
        monitor.sample_all();
        assert!(monitor.stats("target-a").unwrap().get().memory > 0.0);

        // Corrupt the snapshot source; the already-open handle reads the
        // new content on the next tick.
        fs::write(dir.path().join("memory.current"), "garbage\n").unwrap();
        monitor.sample_all();

        let stats = monitor.stats("target-a").unwrap();
        let entry = stats.get();
        assert!(entry.invalid);
        assert_eq!(entry.memory, 0.0);
        assert_eq!(entry.id, "target-a");
        assert!(stats.error().is_some());
    }

    #[test]
    fn test_missing_netdev_degrades_to_zero_counters() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_dir(dir.path());

        let monitor = Monitor::default();
        monitor.register(MonitoredTarget::with_netdev_path(
            "target-a",
            Collector::for_cgroup_dir(dir.path()),
            dir.path().join("missing-netdev"),
        ));
        monitor.sample_all();

        let entry = monitor.stats("target-a").unwrap().get();
        assert!(!entry.invalid);
        assert_eq!(entry.network_rx, 0.0);
        assert_eq!(entry.network_tx, 0.0);
    }

    #[test]
    fn test_remove_target() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_dir(dir.path());

        let monitor = Monitor::default();
        monitor.register(target_for(dir.path(), "target-a"));
        monitor.remove("target-a");
        assert!(monitor.is_empty());
        assert!(monitor.stats("target-a").is_none());
    }

    #[tokio::test]
    async fn test_run_samples_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_dir(dir.path());

        let monitor = Arc::new(Monitor::default());
        monitor.register(target_for(dir.path(), "target-a"));
        let stats = monitor.stats("target-a").unwrap();

        let handle = tokio::spawn(run(Arc::clone(&monitor), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(stats.get().pids_current, 3);
    }
}
