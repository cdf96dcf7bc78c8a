use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::builder::{self, BuildDefaults};
use crate::document::{self, ItemDetails, ParsedDocument, RawItem};
use crate::enrichment::{Enricher, LookupKey};
use crate::error::IngestError;
use crate::m3u;
use crate::models::{CacheStatus, Catalog, CatalogKind, Channel, Movie, Series, SourceCounts, SERIES_ID_BASE};
use crate::source::{SourceDescriptor, SourceFetcher, SourceRegistry};

type Fetched = Vec<(SourceDescriptor, Result<String, IngestError>)>;

struct CacheEntry {
    catalog: Catalog,
    fetched_at: DateTime<Utc>,
    loaded: Instant,
}

#[derive(Default)]
struct CacheSlot {
    entry: RwLock<Option<Arc<CacheEntry>>>,
    gate: Mutex<()>,
    generation: AtomicU64,
}

impl CacheSlot {
    async fn fresh(&self, ttl: Duration) -> Option<Catalog> {
        let entry = self.entry.read().await.clone()?;
        if ttl.is_zero() || entry.loaded.elapsed() > ttl {
            return None;
        }
        Some(entry.catalog.clone())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Stores `catalog` unless the slot was cleared after `generation` was read.
    async fn store(&self, generation: u64, catalog: Catalog) -> bool {
        let mut entry = self.entry.write().await;
        if self.generation() != generation {
            return false;
        }
        *entry = Some(Arc::new(CacheEntry {
            catalog,
            fetched_at: Utc::now(),
            loaded: Instant::now(),
        }));
        true
    }

    async fn clear(&self) {
        let mut entry = self.entry.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *entry = None;
    }

    async fn status(&self, ttl: Duration) -> CacheStatus {
        match self.entry.read().await.as_ref() {
            Some(entry) => CacheStatus {
                valid: !ttl.is_zero() && entry.loaded.elapsed() <= ttl,
                item_count: entry.catalog.len(),
                fetched_at: Some(entry.fetched_at),
            },
            None => CacheStatus {
                valid: false,
                item_count: 0,
                fetched_at: None,
            },
        }
    }
}

pub struct CatalogService {
    registry: SourceRegistry,
    fetcher: Arc<dyn SourceFetcher>,
    enricher: Arc<dyn Enricher>,
    ttl: Duration,
    defaults: BuildDefaults,
    movies: CacheSlot,
    series: CacheSlot,
    channels: CacheSlot,
}

impl CatalogService {
    pub fn new(
        registry: SourceRegistry,
        fetcher: Arc<dyn SourceFetcher>,
        enricher: Arc<dyn Enricher>,
        ttl: Duration,
        defaults: BuildDefaults,
    ) -> Self {
        Self {
            registry,
            fetcher,
            enricher,
            ttl,
            defaults,
            movies: CacheSlot::default(),
            series: CacheSlot::default(),
            channels: CacheSlot::default(),
        }
    }

    fn slot(&self, kind: CatalogKind) -> &CacheSlot {
        match kind {
            CatalogKind::Movies => &self.movies,
            CatalogKind::Series => &self.series,
            CatalogKind::Channels => &self.channels,
        }
    }

    /// Cached catalog for `kind`, loading it when missing or expired.
    /// Never fails: unusable sources simply contribute nothing.
    pub async fn get_catalog(&self, kind: CatalogKind) -> Catalog {
        let slot = self.slot(kind);
        if let Some(catalog) = slot.fresh(self.ttl).await {
            return catalog;
        }

        let _gate = slot.gate.lock().await;
        // Another caller may have finished the load while we waited.
        if let Some(catalog) = slot.fresh(self.ttl).await {
            debug!("Joined in-flight {} load", kind);
            return catalog;
        }

        self.load_into(slot, kind).await
    }

    pub async fn reload(&self, kind: CatalogKind) -> Catalog {
        let slot = self.slot(kind);
        let _gate = slot.gate.lock().await;
        self.load_into(slot, kind).await
    }

    pub async fn movies(&self) -> Arc<Vec<Movie>> {
        match self.get_catalog(CatalogKind::Movies).await {
            Catalog::Movies(items) => items,
            _ => Arc::default(),
        }
    }

    pub async fn series(&self) -> Arc<Vec<Series>> {
        match self.get_catalog(CatalogKind::Series).await {
            Catalog::Series(items) => items,
            _ => Arc::default(),
        }
    }

    pub async fn channels(&self) -> Arc<Vec<Channel>> {
        match self.get_catalog(CatalogKind::Channels).await {
            Catalog::Channels(items) => items,
            _ => Arc::default(),
        }
    }

    pub async fn clear(&self, kind: Option<CatalogKind>) {
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => CatalogKind::ALL.to_vec(),
        };
        for kind in kinds {
            self.slot(kind).clear().await;
            info!("Cleared {} cache", kind);
        }
    }

    pub async fn cache_status(&self) -> Vec<(CatalogKind, CacheStatus)> {
        let mut statuses = Vec::with_capacity(CatalogKind::ALL.len());
        for kind in CatalogKind::ALL {
            statuses.push((kind, self.slot(kind).status(self.ttl).await));
        }
        statuses
    }

    pub async fn reload_sources(&self) -> SourceCounts {
        let counts = self.registry.reload().await;
        self.clear(None).await;
        counts
    }

    async fn load_into(&self, slot: &CacheSlot, kind: CatalogKind) -> Catalog {
        let generation = slot.generation();
        let started = Instant::now();

        let catalog = match kind {
            CatalogKind::Movies => Catalog::Movies(Arc::new(self.load_movies().await)),
            CatalogKind::Series => Catalog::Series(Arc::new(self.load_series().await)),
            CatalogKind::Channels => Catalog::Channels(Arc::new(self.load_channels().await)),
        };

        if slot.store(generation, catalog.clone()).await {
            info!(
                "Loaded {} {} in {:?}",
                catalog.len(),
                kind,
                started.elapsed()
            );
        } else {
            info!("Discarded {} load; cache was cleared while it ran", kind);
        }
        catalog
    }

    async fn fetch_all(&self, sources: &[SourceDescriptor]) -> Fetched {
        let handles: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let fetcher = Arc::clone(&self.fetcher);
                tokio::spawn(async move {
                    let body = fetcher.fetch(&source).await;
                    (source, body)
                })
            })
            .collect();

        let mut fetched = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => fetched.push(result),
                Err(e) => warn!("Source fetch task failed: {}", e),
            }
        }
        fetched
    }

    async fn fetch_kind(&self, kind: CatalogKind) -> (Fetched, Fetched) {
        let sources = self.registry.list_sources(kind).await;
        debug!(
            "Fetching {} {} sources ({} structured, {} playlists)",
            sources.len(),
            kind,
            sources.structured.len(),
            sources.playlists.len()
        );
        tokio::join!(
            self.fetch_all(&sources.structured),
            self.fetch_all(&sources.playlists)
        )
    }

    async fn enrich(&self, details: &mut ItemDetails, is_movie: bool) {
        if !details.needs_enrichment() {
            return;
        }
        let key = LookupKey::for_details(details, is_movie);
        match self.enricher.lookup(&key).await {
            Ok(Some(data)) => data.apply(details, is_movie),
            Ok(None) => debug!("No enrichment for {:?}", key),
            Err(e) => warn!("Enrichment failed for {:?}: {}", key, e),
        }
    }

    async fn load_movies(&self) -> Vec<Movie> {
        let kind = CatalogKind::Movies;
        let (structured, playlists) = self.fetch_kind(kind).await;
        let mut seen = HashSet::new();
        let mut movies = Vec::new();

        for (source, body) in structured {
            let Some(doc) = parsed(kind, &source, body) else {
                continue;
            };
            let before = movies.len();
            for item in doc.items {
                let RawItem::Movie(mut item) = item else {
                    continue;
                };
                let Some(id) = item.content_id else {
                    continue;
                };
                if !seen.insert(id) {
                    continue;
                }
                self.enrich(&mut item.details, true).await;
                movies.push(builder::build_movie(id, item, &doc.category, &self.defaults));
            }
            info!("{} movies from {}", movies.len() - before, source);
        }

        for (source, body) in playlists {
            let Some(body) = usable(kind, &source, body) else {
                continue;
            };
            let before = movies.len();
            movies.extend(
                m3u::parse_movies(&body)
                    .into_iter()
                    .filter(|movie| seen.insert(movie.id)),
            );
            info!("{} movies from playlist {}", movies.len() - before, source);
        }

        movies
    }

    async fn load_series(&self) -> Vec<Series> {
        let kind = CatalogKind::Series;
        let (structured, playlists) = self.fetch_kind(kind).await;
        let mut seen_titles = HashSet::new();
        let mut next_id = SERIES_ID_BASE;
        let mut series = Vec::new();

        for (source, body) in structured {
            let Some(doc) = parsed(kind, &source, body) else {
                continue;
            };
            let before = series.len();
            for item in doc.items {
                let RawItem::Series(mut item) = item else {
                    continue;
                };
                if !seen_titles.insert(builder::series_title(&item.details)) {
                    continue;
                }
                self.enrich(&mut item.details, false).await;
                let draft = builder::series_draft(item, &doc.category);
                series.push(draft.into_series(next_id));
                next_id += 1;
            }
            info!(
                "{} series ({} episodes) from {}",
                series.len() - before,
                episodes_since(&series, before),
                source
            );
        }

        for (source, body) in playlists {
            let Some(body) = usable(kind, &source, body) else {
                continue;
            };
            let before = series.len();
            for draft in m3u::parse_series(&body) {
                if !seen_titles.insert(draft.title.clone()) {
                    continue;
                }
                series.push(draft.into_series(next_id));
                next_id += 1;
            }
            info!(
                "{} series ({} episodes) from playlist {}",
                series.len() - before,
                episodes_since(&series, before),
                source
            );
        }

        series
    }

    async fn load_channels(&self) -> Vec<Channel> {
        let kind = CatalogKind::Channels;
        let (structured, playlists) = self.fetch_kind(kind).await;
        let mut seen = HashSet::new();
        let mut counter: i64 = 1;
        let mut channels = Vec::new();

        for (source, body) in structured {
            let Some(doc) = parsed(kind, &source, body) else {
                continue;
            };
            let before = channels.len();
            for item in doc.items {
                let RawItem::Channel(item) = item else {
                    continue;
                };
                let id = item.id.unwrap_or(counter);
                if !seen.insert(id) {
                    continue;
                }
                counter += 1;
                channels.push(builder::build_channel(id, item, &doc.category));
            }
            info!("{} channels from {}", channels.len() - before, source);
        }

        for (source, body) in playlists {
            let Some(body) = usable(kind, &source, body) else {
                continue;
            };
            let before = channels.len();
            channels.extend(
                m3u::parse_channels(&body, &mut counter)
                    .into_iter()
                    .filter(|channel| seen.insert(channel.id)),
            );
            info!("{} channels from playlist {}", channels.len() - before, source);
        }

        channels
    }
}

fn episodes_since(series: &[Series], start: usize) -> usize {
    series[start..].iter().map(Series::episode_count).sum()
}

fn usable(
    kind: CatalogKind,
    source: &SourceDescriptor,
    body: Result<String, IngestError>,
) -> Option<String> {
    match body {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("Skipping {} source {}: {}", kind, source, e);
            None
        }
    }
}

fn parsed(
    kind: CatalogKind,
    source: &SourceDescriptor,
    body: Result<String, IngestError>,
) -> Option<ParsedDocument> {
    let body = usable(kind, source, body)?;
    match document::parse_document(source, &body, kind) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Skipping {} source {}: {}", kind, source, e);
            None
        }
    }
}
