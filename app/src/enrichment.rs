use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::document::ItemDetails;
use crate::error::IngestError;

pub const DEFAULT_MEMO_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub id: Option<String>,
    pub title: Option<String>,
    pub is_movie: bool,
}

impl LookupKey {
    pub fn for_details(details: &ItemDetails, is_movie: bool) -> Self {
        Self {
            id: details.external_id.clone(),
            title: details.title.clone(),
            is_movie,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentData {
    pub year: Option<String>,
    pub genres: Vec<String>,
    pub rating: Option<String>,
    pub overview: Option<String>,
    pub cast: Vec<String>,
    pub director: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub runtime: Option<u32>,
}

impl EnrichmentData {
    pub fn apply(&self, details: &mut ItemDetails, is_movie: bool) {
        fill(&mut details.year, &self.year);
        fill(&mut details.rating, &self.rating);
        fill(&mut details.synopsis, &self.overview);
        fill(&mut details.director, &self.director);
        fill(&mut details.vertical_image, &self.poster_url);
        fill(&mut details.poster_image, &self.backdrop_url);

        if details.genres.is_empty() {
            details.genres = self.genres.clone();
        }
        if details.cast.is_empty() {
            details.cast = self.cast.clone();
        }
        if is_movie && details.duration.is_none() {
            details.duration = self.runtime.map(|minutes| format!("{} min", minutes));
        }
    }
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        *slot = value.clone();
    }
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn lookup(&self, key: &LookupKey) -> Result<Option<EnrichmentData>, IngestError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn lookup(&self, _key: &LookupKey) -> Result<Option<EnrichmentData>, IngestError> {
        Ok(None)
    }
}

struct Memo {
    entries: HashMap<LookupKey, Option<EnrichmentData>>,
    order: VecDeque<LookupKey>,
}

/// Remembers every answer, misses and failures included, for a bounded
/// number of keys. The oldest key is evicted first.
pub struct MemoizedEnricher<E> {
    inner: E,
    capacity: usize,
    memo: Mutex<Memo>,
}

impl<E: Enricher> MemoizedEnricher<E> {
    pub fn new(inner: E) -> Self {
        Self::with_capacity(inner, DEFAULT_MEMO_CAPACITY)
    }

    pub fn with_capacity(inner: E, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            memo: Mutex::new(Memo {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }
}

#[async_trait]
impl<E: Enricher> Enricher for MemoizedEnricher<E> {
    async fn lookup(&self, key: &LookupKey) -> Result<Option<EnrichmentData>, IngestError> {
        if let Some(hit) = self.memo.lock().await.entries.get(key) {
            debug!("Enrichment memo hit for {:?}", key);
            return Ok(hit.clone());
        }

        let answer = match self.inner.lookup(key).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Enrichment lookup failed for {:?}: {}", key, e);
                None
            }
        };

        let mut memo = self.memo.lock().await;
        if !memo.entries.contains_key(key) {
            if memo.order.len() >= self.capacity {
                if let Some(oldest) = memo.order.pop_front() {
                    memo.entries.remove(&oldest);
                }
            }
            memo.order.push_back(key.clone());
            memo.entries.insert(key.clone(), answer.clone());
        }

        Ok(answer)
    }
}
