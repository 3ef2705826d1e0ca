//! One scrape: both collectors run concurrently, the scrape fails if either
//! one does.
use exporter_core::task::join_all;
use lease_file::{LeaseCollector, LeaseError};
use stats_query::{StatsCollector, StatsError};
use tokio::task::JoinError;
use tracing::{debug, instrument};

/// Any reason a scrape can fail
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    /// dnsmasq did not answer or answered something unexpected
    #[error(transparent)]
    Stats(#[from] StatsError),
    /// the leases file could not be read
    #[error(transparent)]
    Leases(#[from] LeaseError),
    /// a collector task panicked
    #[error("collector task failed: {0}")]
    Task(#[from] JoinError),
}

/// Runs the stats and lease collectors for each scrape request.
///
/// Concurrent scrapes are not serialized against each other; they write the
/// same gauges and the last writer wins.
#[derive(Debug, Clone)]
pub struct Scraper {
    stats: StatsCollector,
    leases: LeaseCollector,
}

impl Scraper {
    /// Create a new scraper from its two collectors
    pub fn new(stats: StatsCollector, leases: LeaseCollector) -> Self {
        Self { stats, leases }
    }

    /// Refresh every gauge. Both collectors always run to completion, the
    /// first error observed is returned.
    #[instrument(skip_all)]
    pub async fn scrape(&self) -> Result<(), ScrapeError> {
        let stats = self.stats.clone();
        let leases = self.leases.clone();
        let handles = [
            tokio::spawn(async move { stats.collect().await.map_err(ScrapeError::from) }),
            tokio::spawn(async move {
                leases
                    .collect()
                    .await
                    .map(|_| ())
                    .map_err(ScrapeError::from)
            }),
        ];
        join_all(handles).await?;
        debug!("scrape complete");
        Ok(())
    }
}
