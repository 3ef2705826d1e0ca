//! # metrics
//!
//! The gauges exported for dnsmasq and the [`MetricSink`] seam the
//! collectors write through.
//!
//! dnsmasq answers cache statistics as TXT records of class CHAOS in the
//! `bind` domain: `cachesize.bind`, `insertions.bind`, `evictions.bind`,
//! `misses.bind`, `hits.bind`, `auth.bind` and `servers.bind`, e.g.
//! `dig +short chaos txt cachesize.bind`.
use std::fmt;

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

/// Name of the per-upstream `servers.bind.` statistic. It carries
/// `<server> <successes> <errors>` tuples and is not decoded yet.
pub const SERVERS_RECORD: &str = "servers.bind.";

/// Label names of `dnsmasq_lease_expiry`, in `with_label_values` order
pub const LEASE_LABELS: [&str; 4] = ["mac_address", "ip_address", "computer_name", "client_id"];

/// One of the single-value cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    /// configured size of the DNS cache
    CacheSize,
    /// DNS cache insertions
    Insertions,
    /// DNS cache evictions
    Evictions,
    /// DNS cache misses
    Misses,
    /// DNS cache hits
    Hits,
    /// queries for authoritative zones
    Auth,
}

static STAT_RECORDS: phf::Map<&'static str, Stat> = phf::phf_map! {
    "cachesize.bind." => Stat::CacheSize,
    "insertions.bind." => Stat::Insertions,
    "evictions.bind." => Stat::Evictions,
    "misses.bind." => Stat::Misses,
    "hits.bind." => Stat::Hits,
    "auth.bind." => Stat::Auth,
};

impl Stat {
    /// every statistic, in query order
    pub const ALL: [Stat; 6] = [
        Stat::CacheSize,
        Stat::Insertions,
        Stat::Evictions,
        Stat::Misses,
        Stat::Hits,
        Stat::Auth,
    ];

    /// Look up the statistic answered under the fully qualified `name`
    /// (case-insensitive). Unknown names yield `None`.
    pub fn from_record(name: &str) -> Option<Stat> {
        STAT_RECORDS
            .get(name)
            .or_else(|| STAT_RECORDS.get(name.to_ascii_lowercase().as_str()))
            .copied()
    }

    /// fully qualified DNS name the statistic is queried under
    pub fn record_name(self) -> &'static str {
        match self {
            Stat::CacheSize => "cachesize.bind.",
            Stat::Insertions => "insertions.bind.",
            Stat::Evictions => "evictions.bind.",
            Stat::Misses => "misses.bind.",
            Stat::Hits => "hits.bind.",
            Stat::Auth => "auth.bind.",
        }
    }

    /// exported metric name
    pub fn metric_name(self) -> &'static str {
        match self {
            Stat::CacheSize => "dnsmasq_cachesize",
            Stat::Insertions => "dnsmasq_insertions",
            Stat::Evictions => "dnsmasq_evictions",
            Stat::Misses => "dnsmasq_misses",
            Stat::Hits => "dnsmasq_hits",
            Stat::Auth => "dnsmasq_auth",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Stat::CacheSize => "configured size of the DNS cache",
            Stat::Insertions => "DNS cache insertions",
            Stat::Evictions => {
                "DNS cache evictions: numbers of entries which replaced an unexpired cache entry"
            }
            Stat::Misses => "DNS cache misses: queries which had to be forwarded",
            Stat::Hits => "DNS queries answered locally (cache hits)",
            Stat::Auth => "DNS queries for authoritative zones",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Identity of a lease series in `dnsmasq_lease_expiry`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseLabels<'a> {
    /// client hardware address
    pub mac_address: &'a str,
    /// leased address
    pub ip_address: &'a str,
    /// host name the client sent, `*` when none
    pub computer_name: &'a str,
    /// client identifier, `*` when none
    pub client_id: &'a str,
}

impl<'a> LeaseLabels<'a> {
    fn values(&self) -> [&'a str; 4] {
        [
            self.mac_address,
            self.ip_address,
            self.computer_name,
            self.client_id,
        ]
    }
}

/// Write access to the exported metrics.
///
/// Every method is independently thread-safe. There is no lock spanning
/// multiple calls, concurrent scrapes may interleave their writes.
pub trait MetricSink: fmt::Debug + Send + Sync + 'static {
    /// set the gauge of a single-value statistic
    fn set_stat(&self, stat: Stat, value: f64);
    /// set `dnsmasq_leases`
    fn set_leases(&self, count: f64);
    /// drop every `dnsmasq_lease_expiry` series
    fn reset_lease_expiry(&self);
    /// set (or replace) one `dnsmasq_lease_expiry` series
    fn set_lease_expiry(&self, labels: &LeaseLabels<'_>, expiry: f64);
}

/// The gauges exported for dnsmasq. Built once at startup and shared by
/// reference with both collectors.
#[derive(Clone)]
pub struct DnsmasqMetrics {
    stats: [Gauge; 6],
    leases: Gauge,
    lease_expiry: GaugeVec,
}

impl fmt::Debug for DnsmasqMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsmasqMetrics")
            .field("leases", &self.leases())
            .field("lease_series", &self.lease_series())
            .finish_non_exhaustive()
    }
}

impl DnsmasqMetrics {
    /// Create the (unregistered) metric set
    pub fn new() -> prometheus::Result<Self> {
        let stats = [
            stat_gauge(Stat::CacheSize)?,
            stat_gauge(Stat::Insertions)?,
            stat_gauge(Stat::Evictions)?,
            stat_gauge(Stat::Misses)?,
            stat_gauge(Stat::Hits)?,
            stat_gauge(Stat::Auth)?,
        ];
        let leases = Gauge::with_opts(Opts::new(
            "dnsmasq_leases",
            "Number of DHCP leases handed out",
        ))?;
        let lease_expiry = GaugeVec::new(
            Opts::new(
                "dnsmasq_lease_expiry",
                "Time of lease expiry, in epoch time (seconds since 1970)",
            ),
            &LEASE_LABELS,
        )?;
        Ok(Self {
            stats,
            leases,
            lease_expiry,
        })
    }

    /// Register every gauge with `registry`
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        for gauge in &self.stats {
            registry.register(Box::new(gauge.clone()))?;
        }
        registry.register(Box::new(self.leases.clone()))?;
        registry.register(Box::new(self.lease_expiry.clone()))?;
        Ok(())
    }

    /// current value of a statistic gauge
    pub fn stat(&self, stat: Stat) -> f64 {
        self.stats[stat.index()].get()
    }

    /// current value of `dnsmasq_leases`
    pub fn leases(&self) -> f64 {
        self.leases.get()
    }

    /// current value of a lease series, `None` if the series does not exist
    pub fn lease_expiry(&self, labels: &LeaseLabels<'_>) -> Option<f64> {
        use prometheus::core::Collector;

        let wanted = labels.values();
        self.lease_expiry
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(move |metric| {
                let pairs = metric.get_label();
                LEASE_LABELS.iter().zip(wanted).all(|(name, value)| {
                    pairs
                        .iter()
                        .any(|pair| pair.get_name() == *name && pair.get_value() == value)
                })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// number of `dnsmasq_lease_expiry` series currently exported
    pub fn lease_series(&self) -> usize {
        use prometheus::core::Collector;

        self.lease_expiry
            .collect()
            .iter()
            .map(|family| family.get_metric().len())
            .sum()
    }
}

fn stat_gauge(stat: Stat) -> prometheus::Result<Gauge> {
    Gauge::with_opts(Opts::new(stat.metric_name(), stat.help()))
}

impl MetricSink for DnsmasqMetrics {
    fn set_stat(&self, stat: Stat, value: f64) {
        self.stats[stat.index()].set(value);
    }

    fn set_leases(&self, count: f64) {
        self.leases.set(count);
    }

    fn reset_lease_expiry(&self) {
        self.lease_expiry.reset();
    }

    fn set_lease_expiry(&self, labels: &LeaseLabels<'_>, expiry: f64) {
        self.lease_expiry.with_label_values(&labels.values()).set(expiry);
    }
}

/// Text-encode everything registered in `registry`. Returns the body and its
/// content type.
pub fn render(registry: &Registry) -> prometheus::Result<(String, String)> {
    let encoder = TextEncoder::new();
    let mut buf = String::new();
    encoder.encode_utf8(&registry.gather(), &mut buf)?;
    Ok((buf, encoder.format_type().to_owned()))
}
