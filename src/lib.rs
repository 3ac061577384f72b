use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// cgstat: probes a host's cgroup capabilities and derives per-container
/// resource usage statistics from raw kernel counters.
///
/// The library covers capability probing ([`cgroup::probe`]), cpuset list
/// parsing ([`cgroup::parse`]), raw metric collection ([`cgroup::Collector`]),
/// stats derivation ([`stats::derive`]), and the synchronized holder a
/// poller/consumer pair shares ([`stats::Stats`]). The [`monitor`] module
/// ties these together into a periodic sampling loop.
pub mod cgroup;
pub mod error;
pub mod fsutil;
pub mod monitor;
pub mod net;
pub mod stats;
pub mod sysinfo;

/// Runs the cgstat sampling daemon.
///
/// Probes the capabilities of the configured cgroup path once, then
/// samples it on a fixed interval, logging each derived entry as JSON.
///
/// Configuration comes from the environment:
/// - `CGSTAT_CGROUP_PATH`: cgroup path to monitor, relative to the unified
///   root; defaults to the cgroup this process lives in.
/// - `CGSTAT_PID`: pid whose network namespace is sampled; defaults to the
///   current process.
/// - `CGSTAT_INTERVAL_SECS`: sampling interval, defaults to 1.
///
/// # Errors
///
/// Fails when the cgroup hierarchy is unreachable for the configured path;
/// failures of individual sampling ticks only surface through the log and
/// the holder's sticky error.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cgroup_path = std::env::var("CGSTAT_CGROUP_PATH")
        .ok()
        .or_else(cgroup::self_unified_path)
        .unwrap_or_else(|| "/".to_owned());
    let pid = std::env::var("CGSTAT_PID")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or_else(std::process::id);
    let interval = std::env::var("CGSTAT_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1);
    let interval = Duration::from_secs(interval.max(1));

    log::debug!(
        "cgroup hierarchy: {:?}, default manager: {}, default ns mode: {}",
        cgroup::version(),
        cgroup::default_manager(),
        cgroup::default_ns_mode(),
    );

    let (info, warnings) = cgroup::probe(&cgroup_path)?;
    for warning in &warnings {
        log::warn!("{warning}");
    }
    log::info!("capabilities for `{cgroup_path}`: {}", serde_json::to_string(&info)?);

    let group_dir = Path::new(cgroup::CGROUP_ROOT).join(cgroup_path.trim_start_matches('/'));
    let collector = cgroup::Collector::for_cgroup_dir(&group_dir);

    let monitor = Arc::new(monitor::Monitor::default());
    monitor.register(monitor::MonitoredTarget::new(
        cgroup_path.clone(),
        collector,
        pid,
    ));

    tokio::spawn(monitor::run(Arc::clone(&monitor), interval));

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        for id in monitor.ids() {
            let Some(stats) = monitor.stats(&id) else {
                continue;
            };
            let entry = stats.get();
            if entry.invalid {
                if let Some(err) = stats.error() {
                    log::error!("sampling `{id}` failed: {err}");
                }
                continue;
            }
            log::info!("{}", serde_json::to_string(&entry)?);
        }
    }
}
