/// Entry point for the cgstat sampling daemon.
///
/// Probes the host's cgroup capabilities once at startup, then samples the
/// configured cgroup on a fixed interval, logging each derived stats entry.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., an unreachable cgroup
/// hierarchy for the configured path).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info CGSTAT_CGROUP_PATH=/user.slice cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    cgstat::run().await
}
