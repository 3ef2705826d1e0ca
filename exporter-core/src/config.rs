//! exporter configs

pub mod cli {
    //! Parse from either cli or env var

    /// Default exporter listen address
    pub static DEFAULT_LISTEN: &str = "localhost:9153";
    /// Default dnsmasq leases file
    pub static DEFAULT_LEASES_PATH: &str = "/var/lib/misc/dnsmasq.leases";
    /// Default dnsmasq DNS address, stats are served over regular DNS
    pub static DEFAULT_DNSMASQ_ADDR: &str = "localhost:53";
    /// Default path the scrape endpoint is mounted on
    pub static DEFAULT_METRICS_PATH: &str = "/metrics";
    /// Default timeout (seconds) for one stats exchange with dnsmasq
    pub const DEFAULT_DNS_TIMEOUT: u64 = 2;
    /// tokio worker thread name
    pub static DEFAULT_THREAD_NAME: &str = "dnsmasq-exporter-worker";
    /// default log level. Can use this argument or EXPORTER_LOG env var
    pub const DEFAULT_EXPORTER_LOG: &str = "info";
    /// log as "json", "pretty" or "standard" (unstructured)
    pub const DEFAULT_LOG_FORMAT: &str = "standard";

    use std::{path::PathBuf, time::Duration};

    pub use clap::Parser;

    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "dnsmasq-exporter", bin_name = "dnsmasq-exporter", about, long_about = None)]
    /// parses from cli & environment var. `.env` in the same dir as the binary is loaded as well
    pub struct Config {
        /// listen address for the exporter's HTTP server
        #[clap(long, env, value_parser, default_value = DEFAULT_LISTEN)]
        pub listen: String,
        /// path to the dnsmasq leases file
        #[clap(long = "leases_path", env = "LEASES_PATH", value_parser, default_value = DEFAULT_LEASES_PATH)]
        pub leases_path: PathBuf,
        /// dnsmasq host:port address
        #[clap(long = "dnsmasq", env = "DNSMASQ", value_parser, default_value = DEFAULT_DNSMASQ_ADDR)]
        pub dnsmasq_addr: String,
        /// path under which metrics are served
        #[clap(
            long = "metrics_path",
            env = "METRICS_PATH",
            value_parser = parse_metrics_path,
            default_value = DEFAULT_METRICS_PATH
        )]
        pub metrics_path: String,
        /// timeout (seconds) for the stats query sent to dnsmasq
        #[clap(long, env, value_parser, default_value_t = DEFAULT_DNS_TIMEOUT)]
        pub dns_timeout: u64,
        /// number of tokio worker threads, defaults to the number of logical CPUs
        #[clap(long, env, value_parser)]
        pub threads: Option<usize>,
        /// Worker thread name
        #[clap(long, env, value_parser, default_value = DEFAULT_THREAD_NAME)]
        pub thread_name: String,
        /// set the log level. All valid RUST_LOG arguments are accepted
        #[clap(long, env, value_parser, default_value = DEFAULT_EXPORTER_LOG)]
        pub exporter_log: String,
        /// log output format: standard, json or pretty
        #[clap(long, env, value_parser, default_value = DEFAULT_LOG_FORMAT)]
        pub log_format: String,
    }

    impl Config {
        /// stats query timeout as `Duration`
        pub fn dns_timeout(&self) -> Duration {
            Duration::from_secs(self.dns_timeout)
        }
    }

    fn parse_metrics_path(path: &str) -> Result<String, String> {
        if path.starts_with('/') {
            Ok(path.to_owned())
        } else {
            Err(format!("metrics path must start with '/', got {path:?}"))
        }
    }

}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    /// Logging setup
    #[derive(Debug)]
    pub struct Config {
        /// formatting to apply to logs
        pub log_frmt: String,
    }

    impl Config {
        /// Install the global subscriber. `filter` is an `EnvFilter` directive,
        /// `log_frmt` one of "json", "pretty" or "standard"
        pub fn parse(filter: &str, log_frmt: &str) -> Result<Self> {
            let filter = EnvFilter::try_new(filter)
                .or_else(|_| EnvFilter::try_new("info"))?
                .add_directive("hyper=off".parse()?);

            match log_frmt {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new()),
                        )
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer())
                        .init();
                }
            }

            Ok(Self {
                log_frmt: log_frmt.to_owned(),
            })
        }
    }
}
