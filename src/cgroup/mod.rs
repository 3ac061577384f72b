//! Cgroup capability probing and raw metric collection.
//!
//! This module covers the read-only side of the unified cgroup hierarchy:
//!
//! - Probing which controllers are active for a path and what resource
//!   features that implies ([`probe`], [`Info`]).
//! - Parsing the kernel list format used by cpuset interface files and
//!   answering subset queries against it ([`parse`]).
//! - Reading raw metric snapshots from a cgroup's interface files
//!   ([`Collector`], [`Metrics`]) and the snapshot-level calculations
//!   defined on them.
//! - Hierarchy generation and resource-manager policy discovery
//!   ([`version`], [`default_manager`]).
//!
//! Nothing here writes to the hierarchy or applies limits.
//!
//! # Platform Requirements
//!
//! - Linux with cgroup v2 support.
//! - Read access to `/sys/fs/cgroup` and the per-process files under
//!   `/proc/self`.

mod capability;
mod collector;
mod metrics;
pub mod parse;
mod version;

pub(crate) use version::CGROUP_ROOT;

pub use capability::{Controller, Info, ProbeError, Warning, probe, self_unified_path};
pub use collector::{Collector, CollectorBuilder, SnapshotParseError};
pub use metrics::{
    CpuMetrics, IoEntry, IoMetrics, MemoryMetrics, Metrics, PidsMetrics, UNLIMITED, calculate_io,
    calculate_mem_usage,
};
pub use version::{
    Manager, NsMode, SystemVersion, available_managers, available_ns_modes, default_manager,
    default_ns_mode, is_systemd_available, version,
};
