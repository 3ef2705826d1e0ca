//! # Scrape endpoint
//!
//! This crate serves the exporter's HTTP surface.
//! It exposes the following endpoints:
//!
//! /metrics     scrape (path is configurable)
//! /ping
//! any other    landing page linking to the metrics path
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::cognitive_complexity, clippy::too_many_arguments)]

use std::{fmt, sync::Arc};

use anyhow::Result;
use axum::{Router, extract::Extension, routing};
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub use crate::models::{ServerError, ServerResult};
pub use crate::scrape::{ScrapeError, Scraper};

pub mod scrape;

const PING_PATH: &str = "/ping";

/// Serves scrapes of the metrics registered in `registry`, refreshing them
/// through a [`Scraper`] on every request
pub struct ExternalApi {
    addr: String,
    metrics_path: String,
    scraper: Arc<Scraper>,
    registry: Registry,
}

impl fmt::Debug for ExternalApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalApi")
            .field("addr", &self.addr)
            .field("metrics_path", &self.metrics_path)
            .field("scraper", &self.scraper)
            .finish_non_exhaustive()
    }
}

impl ExternalApi {
    /// Create a new ExternalApi instance. `addr` is resolved when serving.
    pub fn new(
        addr: impl Into<String>,
        metrics_path: impl Into<String>,
        scraper: Scraper,
        registry: Registry,
    ) -> Self {
        Self {
            addr: addr.into(),
            metrics_path: metrics_path.into(),
            scraper: Arc::new(scraper),
            registry,
        }
    }

    /// Build the router. Any path other than the metrics path and `/ping`
    /// gets the landing page. `/ping` is only mounted when the metrics path
    /// is something else.
    pub fn router(&self) -> Router {
        let mut app = Router::new().route(&self.metrics_path, routing::get(handlers::metrics));
        if self.metrics_path != PING_PATH {
            app = app.route(PING_PATH, routing::get(handlers::ping));
        }
        app.fallback(handlers::index)
            .layer(TraceLayer::new_for_http())
            .layer(Extension(handlers::Landing::new(&self.metrics_path)))
            .layer(Extension(Arc::clone(&self.scraper)))
            .layer(Extension(self.registry.clone()))
    }

    /// Bind the configured address and serve until `token` is cancelled
    pub async fn serve(self, token: CancellationToken) -> Result<()> {
        let tcp = TcpListener::bind(self.addr.as_str()).await?;
        self.serve_on(tcp, token).await
    }

    /// Serve on an already bound listener until `token` is cancelled
    pub async fn serve_on(self, tcp: TcpListener, token: CancellationToken) -> Result<()> {
        info!(addr = ?tcp.local_addr()?, "listening");
        info!(path = %self.metrics_path, "serving metrics");
        axum::serve(tcp, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
        debug!("external API shut down");
        Ok(())
    }
}

mod handlers {
    use std::sync::Arc;

    use axum::{
        extract::Extension,
        http::{StatusCode, header},
        response::{Html, IntoResponse},
    };
    use exporter_core::metrics::render;
    use prometheus::Registry;
    use tracing::error;

    use crate::{models::ServerResult, scrape::Scraper};

    /// landing page, rendered once
    #[derive(Debug, Clone)]
    pub(crate) struct Landing(Arc<str>);

    impl Landing {
        pub(crate) fn new(metrics_path: &str) -> Self {
            Self(
                format!(
                    "<html>\n\
                     <head><title>Dnsmasq Exporter</title></head>\n\
                     <body>\n\
                     <h1>Dnsmasq Exporter</h1>\n\
                     <p><a href=\"{metrics_path}\">Metrics</a></p>\n\
                     </body></html>\n"
                )
                .into(),
            )
        }
    }

    pub(crate) async fn index(Extension(landing): Extension<Landing>) -> impl IntoResponse {
        Html(landing.0.to_string())
    }

    pub(crate) async fn metrics(
        Extension(scraper): Extension<Arc<Scraper>>,
        Extension(registry): Extension<Registry>,
    ) -> ServerResult<impl IntoResponse> {
        if let Err(err) = scraper.scrape().await {
            error!(%err, "scrape failed");
            return Err(err.into());
        }
        let (body, content_type) = render(&registry)?;
        Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body))
    }

    pub(crate) async fn ping() -> impl IntoResponse {
        StatusCode::OK
    }
}

/// Various models for API responses
pub mod models {
    use axum::response::IntoResponse;

    // error type
    /// Make our own error that wraps `anyhow::Error`.
    #[derive(Debug)]
    pub struct ServerError(anyhow::Error);
    /// return error result
    pub type ServerResult<T> = Result<T, ServerError>;

    impl IntoResponse for ServerError {
        fn into_response(self) -> axum::response::Response {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("{}", self.0),
            )
                .into_response()
        }
    }

    impl<E> From<E> for ServerError
    where
        E: Into<anyhow::Error>,
    {
        fn from(err: E) -> Self {
            Self(err.into())
        }
    }
}
