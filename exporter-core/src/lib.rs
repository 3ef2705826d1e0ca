//! # exporter-core
//!
//! Shared plumbing for the dnsmasq exporter: flag parsing, tracing setup,
//! the fixed statistic set and the metric registry the collectors write into.
#![warn(
    missing_debug_implementations,
    missing_docs,
    missing_copy_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use async_trait::async_trait;
pub use futures;
pub use prometheus;
pub use tokio;
pub use tracing;

pub use crate::metrics::{DnsmasqMetrics, LeaseLabels, MetricSink, Stat};

pub mod config;
pub mod metrics;
pub mod task;
