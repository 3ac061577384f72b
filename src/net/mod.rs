//! Network link statistics for a process's network namespace.
//!
//! Links are listed from `/proc/<pid>/net/dev`, which exposes the
//! interfaces of the namespace the target process lives in. Loopback
//! interfaces are excluded; byte counters are cumulative since interface
//! creation. The stats deriver only sums whatever links it is handed, so
//! any other lister can be substituted.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use crate::fsutil;

/// Cumulative receive/transmit byte counters for one network link.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LinkStats {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),

    #[error("failed to read line from `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lists the non-loopback links visible to the given process.
///
/// # Errors
///
/// Fails when the net-dev pseudo-file cannot be opened or read, typically
/// because the process has exited.
pub fn links_for_pid(pid: u32) -> Result<Vec<LinkStats>> {
    links_for_path(format!("/proc/{pid}/net/dev"))
}

/// Lists non-loopback links from a net-dev formatted file.
pub fn links_for_path(path: impl AsRef<Path>) -> Result<Vec<LinkStats>> {
    let path = path.as_ref();
    let mut buf = fsutil::open_file_reader(path)?;

    links_from_reader(&mut buf).map_err(|source| Error::ReadLine {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses net-dev content: two header lines, then one line per interface
/// with the name before a colon and sixteen counters after it, of which
/// the first and ninth are the rx/tx byte totals.
fn links_from_reader<R: BufRead>(buf: &mut R) -> io::Result<Vec<LinkStats>> {
    let mut links = Vec::new();
    let mut line = String::new();

    for _ in 0..2 {
        buf.read_line(&mut line)?;
        line.clear();
    }

    while buf.read_line(&mut line)? != 0 {
        if let Some(link) = link_from_line(&line) {
            links.push(link);
        }
        line.clear();
    }

    Ok(links)
}

fn link_from_line(line: &str) -> Option<LinkStats> {
    let (name, data) = line.trim().split_once(':')?;
    let name = name.trim();
    if name.starts_with("lo") {
        return None;
    }

    let mut fields = data.split_whitespace();
    let rx_bytes = fields.next()?.parse().unwrap_or(0);
    let tx_bytes = fields.nth(7)?.parse().unwrap_or(0);

    Some(LinkStats {
        name: name.to_owned(),
        rx_bytes,
        tx_bytes,
    })
}

/// Sums the receive and transmit byte counters across all supplied links.
pub fn stats_for_links(links: &[LinkStats]) -> (f64, f64) {
    let mut received = 0.0;
    let mut transmitted = 0.0;

    for link in links {
        received += link.rx_bytes as f64;
        transmitted += link.tx_bytes as f64;
    }

    (received, transmitted)
}
