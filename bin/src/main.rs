#![allow(clippy::cognitive_complexity)]
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use exporter_core::{
    DnsmasqMetrics, MetricSink,
    config::{
        cli::{self, Parser},
        trace,
    },
    prometheus::Registry,
    tokio::{self, runtime::Builder, signal, task::JoinHandle},
    tracing::*,
};
use external_api::{ExternalApi, Scraper};
use lease_file::LeaseCollector;
use stats_query::{StatsCollector, UdpStatsClient};

#[cfg(not(target_env = "musl"))]
use jemallocator::Jemalloc;
use tokio_util::sync::CancellationToken;

#[cfg(not(target_env = "musl"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    // .env is loaded first so its values can fill in flags
    let dotenv = dotenv::dotenv();
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.exporter_log, &config.log_format)?;
    debug!(?config, ?trace_config);
    if let Err(err) = dotenv {
        debug!(?err, ".env file not loaded");
    }

    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(&config.thread_name).enable_all();
    // default num threads will be num logical CPUs
    // if we have a configured value here, set it
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    // build the runtime
    let rt = builder.build()?;

    rt.block_on(async move {
        match tokio::spawn(async move { start(config).await }).await {
            Err(err) => {
                error!(?err, "failed to start exporter");
                Err(anyhow!(err))
            }
            Ok(Err(err)) => {
                error!(?err, "exited with error");
                Err(err)
            }
            Ok(Ok(())) => {
                debug!("exiting...");
                Ok(())
            }
        }
    })
}

async fn start(config: cli::Config) -> Result<()> {
    let registry = Registry::new();
    let metrics = Arc::new(DnsmasqMetrics::new().context("failed to create dnsmasq metrics")?);
    metrics
        .register(&registry)
        .context("failed to register dnsmasq metrics")?;
    let sink: Arc<dyn MetricSink> = metrics;

    info!(
        dnsmasq = %config.dnsmasq_addr,
        leases_path = ?config.leases_path,
        "collecting dnsmasq statistics"
    );
    let client = UdpStatsClient::new(config.dnsmasq_addr.clone(), config.dns_timeout());
    let scraper = Scraper::new(
        StatsCollector::new(Arc::new(client), Arc::clone(&sink)),
        LeaseCollector::new(config.leases_path.clone(), sink),
    );
    let api = ExternalApi::new(
        config.listen.clone(),
        config.metrics_path.clone(),
        scraper,
        registry,
    );

    let token = CancellationToken::new();
    let _signal = tokio::spawn(shutdown_signal(token.clone()));
    flatten(tokio::spawn(api.serve(token)))
        .await
        .with_context(|| format!("HTTP server on {} failed", config.listen))
}

async fn flatten<T>(handle: JoinHandle<Result<T, anyhow::Error>>) -> Result<T, anyhow::Error> {
    match handle.await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(err),
        Err(err) => Err(anyhow!(err)),
    }
}

async fn shutdown_signal(token: CancellationToken) -> Result<()> {
    let ret = signal::ctrl_c().await.map_err(|err| anyhow!(err));
    info!("shutting down");
    token.cancel();
    ret
}
