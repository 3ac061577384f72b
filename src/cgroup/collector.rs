//! File-backed metrics source for the cgroup v2 interface files.
//!
//! A [`Collector`] holds buffered handles to the interface files of one
//! cgroup and produces a fresh [`Metrics`] snapshot per call, rewinding
//! each handle afterwards so it can be reused on the next sampling tick.
//! Files that were absent when the collector was built degrade to the
//! snapshot defaults (zeros, unlimited memory limit); read and parse
//! failures are reported to the caller.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::num::ParseIntError;
use std::path::Path;

use super::metrics::{CpuMetrics, IoEntry, IoMetrics, MemoryMetrics, Metrics, PidsMetrics, UNLIMITED};

const CPU_STAT_FILE: &str = "cpu.stat";
const MEMORY_CURRENT_FILE: &str = "memory.current";
const MEMORY_STAT_FILE: &str = "memory.stat";
const MEMORY_MAX_FILE: &str = "memory.max";
const IO_STAT_FILE: &str = "io.stat";
const PIDS_CURRENT_FILE: &str = "pids.current";

/// Error produced when an interface file holds a value that does not parse.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotParseError {
    #[error("invalid value for '{key}' at line {line}: '{value}': {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid value: '{value}': {source}")]
    InvalidValue {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

impl From<SnapshotParseError> for io::Error {
    fn from(err: SnapshotParseError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Reads raw metric snapshots for a single cgroup.
#[derive(Debug, Default)]
pub struct Collector {
    cpu_stat_file: Option<BufReader<File>>,
    memory_current_file: Option<BufReader<File>>,
    memory_stat_file: Option<BufReader<File>>,
    memory_max_file: Option<BufReader<File>>,
    io_stat_file: Option<BufReader<File>>,
    pids_current_file: Option<BufReader<File>>,
}

impl Collector {
    /// Builds a collector for the standard interface files directly under
    /// the given cgroup directory.
    pub fn for_cgroup_dir(path: impl AsRef<Path>) -> Self {
        let dir = path.as_ref();
        CollectorBuilder::default()
            .cpu_stat_file(dir.join(CPU_STAT_FILE))
            .memory_current_file(dir.join(MEMORY_CURRENT_FILE))
            .memory_stat_file(dir.join(MEMORY_STAT_FILE))
            .memory_max_file(dir.join(MEMORY_MAX_FILE))
            .io_stat_file(dir.join(IO_STAT_FILE))
            .pids_current_file(dir.join(PIDS_CURRENT_FILE))
            .build()
    }

    /// Reads a fresh snapshot from all held interface files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any held file fails to read, rewind, or
    /// parse; the typical cause is the cgroup having been removed since
    /// the collector was built.
    pub fn refresh(&mut self) -> io::Result<Metrics> {
        let cpu = parse_and_rewind(&mut self.cpu_stat_file, parse_cpu_stat)?.unwrap_or_default();
        let usage =
            parse_and_rewind(&mut self.memory_current_file, parse_single_value)?.unwrap_or(0);
        let inactive_file =
            parse_and_rewind(&mut self.memory_stat_file, parse_memory_stat)?.unwrap_or(0);
        let usage_limit =
            parse_and_rewind(&mut self.memory_max_file, parse_memory_max)?.unwrap_or(UNLIMITED);
        let io_usage = parse_and_rewind(&mut self.io_stat_file, parse_io_stat)?.unwrap_or_default();
        let pids_current =
            parse_and_rewind(&mut self.pids_current_file, parse_single_value)?.unwrap_or(0);

        Ok(Metrics {
            memory: MemoryMetrics {
                usage,
                inactive_file,
                usage_limit,
            },
            cpu,
            io: IoMetrics { usage: io_usage },
            pids: PidsMetrics {
                current: pids_current,
            },
        })
    }
}

/// Builder for [`Collector`], one setter per interface file. Unset or
/// unopenable files stay [`None`] and degrade to snapshot defaults.
#[derive(Debug, Default)]
pub struct CollectorBuilder {
    cpu_stat_file: Option<BufReader<File>>,
    memory_current_file: Option<BufReader<File>>,
    memory_stat_file: Option<BufReader<File>>,
    memory_max_file: Option<BufReader<File>>,
    io_stat_file: Option<BufReader<File>>,
    pids_current_file: Option<BufReader<File>>,
}

impl CollectorBuilder {
    pub fn cpu_stat_file(mut self, path: impl AsRef<Path>) -> Self {
        self.cpu_stat_file = open_file(path);
        self
    }

    pub fn memory_current_file(mut self, path: impl AsRef<Path>) -> Self {
        self.memory_current_file = open_file(path);
        self
    }

    pub fn memory_stat_file(mut self, path: impl AsRef<Path>) -> Self {
        self.memory_stat_file = open_file(path);
        self
    }

    pub fn memory_max_file(mut self, path: impl AsRef<Path>) -> Self {
        self.memory_max_file = open_file(path);
        self
    }

    pub fn io_stat_file(mut self, path: impl AsRef<Path>) -> Self {
        self.io_stat_file = open_file(path);
        self
    }

    pub fn pids_current_file(mut self, path: impl AsRef<Path>) -> Self {
        self.pids_current_file = open_file(path);
        self
    }

    pub fn build(self) -> Collector {
        Collector {
            cpu_stat_file: self.cpu_stat_file,
            memory_current_file: self.memory_current_file,
            memory_stat_file: self.memory_stat_file,
            memory_max_file: self.memory_max_file,
            io_stat_file: self.io_stat_file,
            pids_current_file: self.pids_current_file,
        }
    }
}

#[inline]
fn open_file(path: impl AsRef<Path>) -> Option<BufReader<File>> {
    Some(BufReader::new(File::open(path).ok()?))
}

/// Parses from an optionally held interface file and rewinds the handle for
/// the next tick. A missing handle yields `Ok(None)`.
fn parse_and_rewind<T, R>(
    file: &mut Option<R>,
    parser: impl FnOnce(&mut R) -> io::Result<T>,
) -> io::Result<Option<T>>
where
    R: BufRead + Seek,
{
    let Some(file) = file.as_mut() else {
        return Ok(None);
    };

    let result = parser(file)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(Some(result))
}

fn parse_u64(key: &str, val: &str, line: usize) -> io::Result<u64> {
    val.parse::<u64>()
        .map_err(|source| SnapshotParseError::InvalidKeyValue {
            key: key.to_owned(),
            value: val.to_owned(),
            line,
            source,
        })
        .map_err(io::Error::from)
}

/// Parses `cpu.stat`: whitespace-separated key-value lines, of which only
/// the cumulative usage counters matter here. Unknown keys are ignored.
fn parse_cpu_stat<R: BufRead>(buf: &mut R) -> io::Result<CpuMetrics> {
    let mut stat = CpuMetrics::default();
    let mut line = String::new();
    let mut lineno = 0;

    while buf.read_line(&mut line)? != 0 {
        lineno += 1;
        let mut parts = line.split_whitespace();
        if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
            match key {
                "usage_usec" => stat.usage_usec = parse_u64(key, val, lineno)?,
                "system_usec" => stat.system_usec = parse_u64(key, val, lineno)?,
                _ => {}
            }
        }
        line.clear();
    }

    Ok(stat)
}

/// Parses `memory.stat` for the inactive file-cache counter.
fn parse_memory_stat<R: BufRead>(buf: &mut R) -> io::Result<u64> {
    let mut inactive_file = 0;
    let mut line = String::new();
    let mut lineno = 0;

    while buf.read_line(&mut line)? != 0 {
        lineno += 1;
        let mut parts = line.split_whitespace();
        if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
            if key == "inactive_file" {
                inactive_file = parse_u64(key, val, lineno)?;
                break;
            }
        }
        line.clear();
    }

    Ok(inactive_file)
}

/// Parses a single-value interface file such as `memory.current` or
/// `pids.current`.
fn parse_single_value<R: BufRead>(buf: &mut R) -> io::Result<u64> {
    let mut line = String::new();
    buf.read_line(&mut line)?;
    let line = line.trim();

    line.parse::<u64>()
        .map_err(|source| SnapshotParseError::InvalidValue {
            value: line.to_owned(),
            source,
        })
        .map_err(io::Error::from)
}

/// Parses `memory.max`, where the literal `max` is the unlimited sentinel.
fn parse_memory_max<R: BufRead>(buf: &mut R) -> io::Result<u64> {
    let mut line = String::new();
    buf.read_line(&mut line)?;
    let line = line.trim();

    if line == "max" {
        return Ok(UNLIMITED);
    }

    line.parse::<u64>()
        .map_err(|source| SnapshotParseError::InvalidValue {
            value: line.to_owned(),
            source,
        })
        .map_err(io::Error::from)
}

/// Parses `io.stat`: one line per device, `MAJ:MIN` followed by `key=value`
/// pairs. Lines without a device identifier and malformed pairs are
/// skipped; unknown keys are ignored.
fn parse_io_stat<R: BufRead>(buf: &mut R) -> io::Result<Vec<IoEntry>> {
    let mut usage = Vec::new();
    let mut line = String::new();
    let mut lineno = 0;

    while buf.read_line(&mut line)? != 0 {
        lineno += 1;
        let mut parts = line.split_whitespace();

        let Some((major, minor)) = parts.next().and_then(parse_device_id) else {
            line.clear();
            continue;
        };

        let mut entry = IoEntry {
            major,
            minor,
            ..IoEntry::default()
        };
        for part in parts {
            let Some((key, val)) = part.split_once('=') else {
                continue;
            };
            match key {
                "rbytes" => entry.rbytes = parse_u64(key, val, lineno)?,
                "wbytes" => entry.wbytes = parse_u64(key, val, lineno)?,
                "rios" => entry.rios = parse_u64(key, val, lineno)?,
                "wios" => entry.wios = parse_u64(key, val, lineno)?,
                _ => {}
            }
        }

        usage.push(entry);
        line.clear();
    }

    Ok(usage)
}

fn parse_device_id(token: &str) -> Option<(u64, u64)> {
    let (major, minor) = token.split_once(':')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_parse_cpu_stat() {
        let data = "\
usage_usec 623932088000
user_usec 421230248000
system_usec 202701840000
nr_periods 0
";
        let stat = parse_cpu_stat(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.usage_usec, 623_932_088_000);
        assert_eq!(stat.system_usec, 202_701_840_000);
    }

    #[test]
    fn test_parse_cpu_stat_empty() {
        let stat = parse_cpu_stat(&mut "".as_bytes()).unwrap();
        assert_eq!(stat, CpuMetrics::default());
    }

    #[test]
    fn test_parse_cpu_stat_invalid_value() {
        let data = "usage_usec abc\n";
        let err = parse_cpu_stat(&mut data.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_memory_stat_picks_inactive_file() {
        let data = "\
anon 1000
file 2000
inactive_file 1500
active_file 500
";
        assert_eq!(parse_memory_stat(&mut data.as_bytes()).unwrap(), 1500);
    }

    #[test]
    fn test_parse_memory_stat_missing_key_defaults_to_zero() {
        let data = "anon 1000\n";
        assert_eq!(parse_memory_stat(&mut data.as_bytes()).unwrap(), 0);
    }

    #[test]
    fn test_parse_single_value() {
        assert_eq!(parse_single_value(&mut "8192\n".as_bytes()).unwrap(), 8192);
    }

    #[test]
    fn test_parse_single_value_invalid() {
        let err = parse_single_value(&mut "abcd\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_memory_max() {
        assert_eq!(parse_memory_max(&mut "max\n".as_bytes()).unwrap(), UNLIMITED);
        assert_eq!(
            parse_memory_max(&mut "104857600\n".as_bytes()).unwrap(),
            104_857_600
        );
    }

    #[test]
    fn test_parse_io_stat_per_device() {
        let data = "\
8:0 rbytes=1024 wbytes=2048 rios=12 wios=24 dbytes=0 dios=0
254:0 rbytes=100 wbytes=200 rios=1 wios=2
";
        let usage = parse_io_stat(&mut data.as_bytes()).unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].major, 8);
        assert_eq!(usage[0].minor, 0);
        assert_eq!(usage[0].rbytes, 1024);
        assert_eq!(usage[0].wios, 24);
        assert_eq!(usage[1].major, 254);
        assert_eq!(usage[1].rios, 1);
    }

    #[test]
    fn test_parse_io_stat_skips_lines_without_device_id() {
        let data = "not-a-device rbytes=1\n8:16 rbytes=7 rios=1\n";
        let usage = parse_io_stat(&mut data.as_bytes()).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].minor, 16);
    }

    #[test]
    fn test_parse_io_stat_ignores_malformed_pairs() {
        let data = "8:0 rbytes=1024 malformedpair wios=24\n";
        let usage = parse_io_stat(&mut data.as_bytes()).unwrap();
        assert_eq!(usage[0].rbytes, 1024);
        assert_eq!(usage[0].wios, 24);
        assert_eq!(usage[0].wbytes, 0);
    }

    #[test]
    fn test_parse_io_stat_invalid_value_errors() {
        let data = "8:0 rbytes=abc\n";
        let err = parse_io_stat(&mut data.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_refresh_from_cgroup_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CPU_STAT_FILE),
            "usage_usec 5000\nsystem_usec 2000\n",
        )
        .unwrap();
        fs::write(dir.path().join(MEMORY_CURRENT_FILE), "4096\n").unwrap();
        fs::write(dir.path().join(MEMORY_STAT_FILE), "inactive_file 1024\n").unwrap();
        fs::write(dir.path().join(MEMORY_MAX_FILE), "max\n").unwrap();
        fs::write(dir.path().join(IO_STAT_FILE), "8:0 rbytes=10 wbytes=20 rios=1 wios=2\n")
            .unwrap();
        fs::write(dir.path().join(PIDS_CURRENT_FILE), "3\n").unwrap();

        let mut collector = Collector::for_cgroup_dir(dir.path());
        let metrics = collector.refresh().unwrap();

        assert_eq!(metrics.cpu.usage_usec, 5000);
        assert_eq!(metrics.cpu.system_usec, 2000);
        assert_eq!(metrics.memory.usage, 4096);
        assert_eq!(metrics.memory.inactive_file, 1024);
        assert_eq!(metrics.memory.usage_limit, UNLIMITED);
        assert_eq!(metrics.io.usage.len(), 1);
        assert_eq!(metrics.pids.current, 3);
    }

    #[test]
    fn test_refresh_is_repeatable_across_ticks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MEMORY_CURRENT_FILE), "4096\n").unwrap();

        let mut collector = Collector::for_cgroup_dir(dir.path());
        let first = collector.refresh().unwrap();
        let second = collector.refresh().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.memory.usage, 4096);
    }

    #[test]
    fn test_refresh_missing_files_degrade_to_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let mut collector = Collector::for_cgroup_dir(dir.path());
        let metrics = collector.refresh().unwrap();
        assert_eq!(metrics, Metrics::default());
        assert_eq!(metrics.memory.usage_limit, UNLIMITED);
    }
}
