//! # lease-file
//!
//! Re-reads the dnsmasq leases file on every scrape. The lease expiry series
//! are dropped and rebuilt from the file each time, so leases that left the
//! file disappear from the export.
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    non_snake_case,
    non_upper_case_globals
)]
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use exporter_core::MetricSink;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{debug, trace, warn};

pub mod record;

pub use crate::record::{LeaseRecord, ParsedLine};

#[derive(thiserror::Error, Debug)]
pub enum LeaseError {
    #[error("could not open leases file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed reading leases file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Counts from one pass over the file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// lines consumed before a `duid` line or EOF, malformed ones included
    pub lines: u64,
    /// lines that produced a lease series
    pub leases: u64,
}

/// Scans the leases file into `dnsmasq_leases` and `dnsmasq_lease_expiry`
#[derive(Debug, Clone)]
pub struct LeaseCollector {
    path: PathBuf,
    sink: Arc<dyn MetricSink>,
}

impl LeaseCollector {
    pub fn new(path: impl Into<PathBuf>, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            path: path.into(),
            sink,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file and replace every lease series.
    ///
    /// `dnsmasq_leases` is only set once the scan reached EOF or a `duid`
    /// line; a read error leaves it untouched. The file is closed on every
    /// return path.
    pub async fn collect(&self) -> Result<ScanSummary, LeaseError> {
        let file = File::open(&self.path).await.map_err(|source| {
            warn!(path = ?self.path, %source, "could not open leases file");
            LeaseError::Open {
                path: self.path.clone(),
                source,
            }
        })?;
        let read_err = |source| LeaseError::Read {
            path: self.path.clone(),
            source,
        };

        self.sink.reset_lease_expiry();
        let mut summary = ScanSummary::default();
        let mut lines = BufReader::new(file).split(b'\n');
        while let Some(line) = lines.next_segment().await.map_err(read_err)? {
            let line = String::from_utf8_lossy(&line);
            let lease = match LeaseRecord::parse(&line) {
                ParsedLine::Duid => {
                    // TODO: DHCPv6 leases, every line after "duid" uses the v6 layout
                    trace!(lines = summary.lines, "reached duid, stopping scan");
                    break;
                }
                ParsedLine::Malformed => {
                    summary.lines += 1;
                    trace!(%line, "skipping malformed lease line");
                    continue;
                }
                ParsedLine::Lease(lease) => lease,
            };
            summary.lines += 1;
            summary.leases += 1;
            self.sink.set_lease_expiry(&lease.labels(), lease.expiry);
        }

        self.sink.set_leases(summary.lines as f64);
        debug!(lines = summary.lines, leases = summary.leases, "scanned leases file");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use exporter_core::{DnsmasqMetrics, LeaseLabels};
    use tempfile::NamedTempFile;
    use tracing_test::traced_test;

    use super::*;

    fn leases_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn collector(path: &Path) -> (LeaseCollector, Arc<DnsmasqMetrics>) {
        let metrics = Arc::new(DnsmasqMetrics::new().unwrap());
        (LeaseCollector::new(path, metrics.clone()), metrics)
    }

    const MYHOST: LeaseLabels<'static> = LeaseLabels {
        mac_address: "aa:bb:cc:dd:ee:ff",
        ip_address: "192.168.1.5",
        computer_name: "myhost",
        client_id: "01:02:03",
    };

    #[tokio::test]
    async fn single_lease() {
        let file = leases_file("1700000000 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03\n");
        let (collector, metrics) = collector(file.path());

        let summary = collector.collect().await.unwrap();
        assert_eq!(summary, ScanSummary { lines: 1, leases: 1 });
        assert_eq!(metrics.leases(), 1.);
        assert_eq!(metrics.lease_series(), 1);
        assert_eq!(metrics.lease_expiry(&MYHOST), Some(1_700_000_000.));
    }

    #[tokio::test]
    async fn no_trailing_newline() {
        let file = leases_file("1700000000 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03");
        let (collector, metrics) = collector(file.path());
        collector.collect().await.unwrap();
        assert_eq!(metrics.leases(), 1.);
        assert_eq!(metrics.lease_expiry(&MYHOST), Some(1_700_000_000.));
    }

    #[tokio::test]
    async fn unparsable_expiry_still_counted() {
        let file = leases_file("bogus aa:bb 192.168.1.5 myhost 01:02\n");
        let (collector, metrics) = collector(file.path());
        collector.collect().await.unwrap();

        assert_eq!(metrics.leases(), 1.);
        let labels = LeaseLabels {
            mac_address: "aa:bb",
            ip_address: "192.168.1.5",
            computer_name: "myhost",
            client_id: "01:02",
        };
        assert_eq!(metrics.lease_expiry(&labels), Some(-1.));
    }

    #[tokio::test]
    async fn malformed_lines_counted_not_exported() {
        let file = leases_file(
            "1700000000 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03\n\
             1700000001 11:22:33:44:55:66 192.168.1.6\n\
             \n",
        );
        let (collector, metrics) = collector(file.path());

        let summary = collector.collect().await.unwrap();
        assert_eq!(summary, ScanSummary { lines: 3, leases: 1 });
        assert_eq!(metrics.leases(), 3.);
        assert_eq!(metrics.lease_series(), 1);
    }

    #[tokio::test]
    async fn stops_at_duid() {
        let file = leases_file(
            "1700000000 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03\n\
             1700000002 11:22:33:44:55:66 192.168.1.7 other *\n\
             duid 00:01:00:01:2a:3b:4c:5d:00:11:22:33:44:55\n\
             1700000003 12345 fd00::5 v6host 00:01:00:01:aa:bb\n",
        );
        let (collector, metrics) = collector(file.path());

        let summary = collector.collect().await.unwrap();
        assert_eq!(summary, ScanSummary { lines: 2, leases: 2 });
        assert_eq!(metrics.leases(), 2.);
        assert_eq!(metrics.lease_series(), 2);
    }

    #[tokio::test]
    async fn duplicate_key_last_wins() {
        let file = leases_file(
            "1 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03\n\
             2 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03\n",
        );
        let (collector, metrics) = collector(file.path());
        collector.collect().await.unwrap();

        assert_eq!(metrics.leases(), 2.);
        assert_eq!(metrics.lease_series(), 1);
        assert_eq!(metrics.lease_expiry(&MYHOST), Some(2.));
    }

    #[tokio::test]
    async fn rescan_is_idempotent_and_drops_stale() {
        let file = leases_file(
            "1700000000 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03\n\
             1700000002 11:22:33:44:55:66 192.168.1.7 other *\n",
        );
        let (collector, metrics) = collector(file.path());

        let first = collector.collect().await.unwrap();
        let second = collector.collect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(metrics.leases(), 2.);
        assert_eq!(metrics.lease_series(), 2);

        // the second lease expired and was removed from the file
        std::fs::write(
            file.path(),
            "1700000000 aa:bb:cc:dd:ee:ff 192.168.1.5 myhost 01:02:03\n",
        )
        .unwrap();
        collector.collect().await.unwrap();
        assert_eq!(metrics.leases(), 1.);
        assert_eq!(metrics.lease_series(), 1);
        assert_eq!(metrics.lease_expiry(&MYHOST), Some(1_700_000_000.));
    }

    #[tokio::test]
    async fn non_utf8_hostname() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"1700000000 aa:bb 10.0.0.9 caf\xe9 *\n").unwrap();
        file.flush().unwrap();
        let (collector, metrics) = collector(file.path());

        collector.collect().await.unwrap();
        assert_eq!(metrics.leases(), 1.);
        assert_eq!(metrics.lease_series(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (collector, metrics) = collector(&dir.path().join("dnsmasq.leases"));
        metrics.set_leases(5.);

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, LeaseError::Open { .. }), "{err:?}");
        assert!(err.to_string().contains("dnsmasq.leases"), "{err}");
        // nothing touched on failure
        assert_eq!(metrics.leases(), 5.);
        assert!(logs_contain("could not open leases file"));
    }

    #[tokio::test]
    async fn read_error_leaves_count() {
        // a directory opens fine but fails on the first read
        let dir = tempfile::tempdir().unwrap();
        let (collector, metrics) = collector(dir.path());
        metrics.set_leases(5.);

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, LeaseError::Read { .. }), "{err:?}");
        assert!(err.to_string().starts_with("failed reading leases file"), "{err}");
        assert_eq!(metrics.leases(), 5.);
    }
}
