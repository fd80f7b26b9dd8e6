//! Geosearch - search and faceting over geotagged, timestamped short texts.
//!
//! # Overview
//!
//! Geosearch turns simple query parameters into a single request to a Solr
//! index and returns documents alongside multi-select facets: time
//! histograms, geographic heatmaps, and top users and words.
//!
//! # API Endpoints
//!
//! - `GET /search` - Documents and facets as JSON
//! - `GET /export` - Documents as a CSV download
//! - `GET /health` - Engine health check
//!
//! # Configuration
//!
//! See [`geosearch::config`] for the `GEOSEARCH_*` environment variables.

use std::net::SocketAddr;

use axum::http::Method;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use geosearch::api::{AppState, router};
use geosearch::config::ServiceConfig;
use geosearch::solr::SolrEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("geosearch=info".parse()?))
        .init();

    let config = ServiceConfig::from_env();
    info!(
        port = config.port,
        solr_url = %config.solr.url,
        collection = %config.solr.collection,
        "Starting Geosearch server"
    );

    let engine = SolrEngine::new(&config.solr)?;
    let state = AppState::new(engine);

    let mut app = router(state);

    if config.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS]),
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Geosearch is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
