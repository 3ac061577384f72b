//! Derived per-container statistics and their synchronized holder.
//!
//! A sampling loop periodically turns a raw [`crate::cgroup::Metrics`]
//! snapshot into an [`Entry`] via [`derive`] and publishes it through a
//! [`Stats`] holder, which arbitrary readers consume concurrently.

mod derive;

pub use derive::{derive, host_memory_limit};

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::cgroup::Metrics;

pub(crate) const NSEC_PER_USEC: u64 = 1_000;

/// Statistics derived from one sampling tick.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Entry {
    /// Identifier of the monitored container or process.
    pub id: String,
    /// CPU usage over the last interval, normalized to a single core.
    pub cpu_percentage: f64,
    /// Working-set memory in bytes.
    pub memory: f64,
    /// Effective memory limit in bytes.
    pub memory_limit: f64,
    /// Memory usage as a percentage of the effective limit.
    pub memory_percentage: f64,
    /// Bytes received across all links.
    pub network_rx: f64,
    /// Bytes transmitted across all links.
    pub network_tx: f64,
    /// Bytes read from block devices.
    pub block_read: f64,
    /// Bytes written to block devices.
    pub block_write: f64,
    /// Current number of pids.
    pub pids_current: u64,
    /// Set when the last sampling tick failed and the numeric fields were
    /// reset.
    pub invalid: bool,
}

/// The previous sampling tick's wall-clock timestamp and cumulative CPU
/// counters, in nanoseconds. Owned by the caller across ticks and replaced
/// wholesale after each derivation.
#[derive(Debug, Clone)]
pub struct ContainerSample {
    pub time: Instant,
    pub cpu_nsec: u64,
    pub system_nsec: u64,
}

impl ContainerSample {
    /// A starting sample with zeroed counters, for the first tick.
    pub fn start() -> Self {
        Self {
            time: Instant::now(),
            cpu_nsec: 0,
            system_nsec: 0,
        }
    }

    /// Captures the cumulative counters of a fresh snapshot together with
    /// the current time.
    pub fn from_metrics(metrics: &Metrics) -> Self {
        Self {
            time: Instant::now(),
            cpu_nsec: metrics.cpu.usage_usec * NSEC_PER_USEC,
            system_nsec: metrics.cpu.system_usec * NSEC_PER_USEC,
        }
    }
}

impl Default for ContainerSample {
    fn default() -> Self {
        Self::start()
    }
}

type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Synchronized holder for the latest [`Entry`] of one monitored
/// container, plus a sticky error.
///
/// One lock guards both; writers must finish their I/O before touching the
/// holder. `set`/`get` perform no validation.
#[derive(Debug, Default)]
pub struct Stats {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entry: Entry,
    err: Option<SharedError>,
}

impl Stats {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entry: Entry {
                    id: id.into(),
                    ..Entry::default()
                },
                err: None,
            }),
        }
    }

    /// Publishes a freshly derived entry. The sticky error, if any, is left
    /// in place for inspection.
    pub fn set(&self, entry: Entry) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entry = entry;
    }

    pub fn get(&self) -> Entry {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entry
            .clone()
    }

    /// Records an error and marks the current entry invalid, keeping its
    /// numeric fields.
    pub fn set_error(&self, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.err = Some(Arc::from(err.into()));
        inner.entry.invalid = true;
    }

    /// Records an error, zeroes every numeric field and marks the entry
    /// invalid, so stale values from a previous tick are never displayed.
    pub fn set_error_and_reset(&self, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = std::mem::take(&mut inner.entry.id);
        inner.entry = Entry {
            id,
            invalid: true,
            ..Entry::default()
        };
        inner.err = Some(Arc::from(err.into()));
    }

    pub fn error(&self) -> Option<SharedError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .err
            .clone()
    }
}
