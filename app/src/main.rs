use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod builder;
mod catalog;
mod config;
mod document;
mod enrichment;
mod error;
mod m3u;
mod models;
mod normalize;
mod source;
mod tmdb;

use crate::builder::BuildDefaults;
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::enrichment::{Enricher, MemoizedEnricher, NoopEnricher};
use crate::source::{HttpFetcher, ManifestSourceProvider, SourceFetcher, SourceRegistry};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting catalog service...");

    let config = Config::new()?;
    info!("Configuration loaded");

    let fetcher: Arc<dyn SourceFetcher> = Arc::new(HttpFetcher::new(config.fetch_timeout())?);

    let provider = ManifestSourceProvider::from_config(&config, Arc::clone(&fetcher));
    let registry = SourceRegistry::load(Box::new(provider)).await;

    let enricher: Arc<dyn Enricher> = match config.tmdb_api_key.as_deref() {
        Some(key) => {
            let client = tmdb::TmdbClient::new(key, config.enrichment_timeout())?;
            info!("TMDB enrichment enabled");
            Arc::new(MemoizedEnricher::new(client))
        }
        None => {
            info!("No TMDB key configured; enrichment disabled");
            Arc::new(NoopEnricher)
        }
    };

    let catalog = CatalogService::new(
        registry,
        fetcher,
        enricher,
        config.cache_ttl(),
        BuildDefaults {
            country: config.default_country.clone(),
        },
    );

    let state = AppState {
        catalog: Arc::new(catalog),
    };

    let app = api::app(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
