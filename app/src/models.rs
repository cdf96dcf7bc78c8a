use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// First id handed out to series in a load pass.
pub const SERIES_ID_BASE: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Movies,
    Series,
    Channels,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [CatalogKind::Movies, CatalogKind::Series, CatalogKind::Channels];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Movies => "movies",
            CatalogKind::Series => "series",
            CatalogKind::Channels => "channels",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movies" | "movie" | "vod" => Ok(CatalogKind::Movies),
            "series" => Ok(CatalogKind::Series),
            "channels" | "channel" | "live" => Ok(CatalogKind::Channels),
            other => Err(format!("unknown catalog kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub plot: String,
    pub cover_url: String,
    pub banner_url: String,
    pub year: String,
    pub genres: Vec<String>,
    pub cast: Vec<String>,
    pub director: String,
    pub rating: String,
    pub rating_5based: String,
    pub duration: String,
    pub country: String,
    pub playback_url: String,
    pub category: String,
    pub external_metadata_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub title: String,
    pub plot: String,
    pub cover_url: String,
    pub banner_url: String,
    pub year: String,
    pub genres: Vec<String>,
    pub cast: Vec<String>,
    pub director: String,
    pub rating: String,
    pub rating_5based: String,
    pub category: String,
    pub seasons: Vec<Season>,
    pub external_metadata_id: Option<String>,
}

impl Series {
    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub season_number: u32,
    pub episode_count: usize,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub episode_number: u32,
    pub title: String,
    pub plot: String,
    pub thumbnail_url: String,
    pub playback_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub logo_url: String,
    pub playback_url: String,
    pub category: String,
    pub epg_channel_id: String,
    pub channel_number: String,
    pub added: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Catalog {
    Movies(Arc<Vec<Movie>>),
    Series(Arc<Vec<Series>>),
    Channels(Arc<Vec<Channel>>),
}

impl Catalog {
    pub fn kind(&self) -> CatalogKind {
        match self {
            Catalog::Movies(_) => CatalogKind::Movies,
            Catalog::Series(_) => CatalogKind::Series,
            Catalog::Channels(_) => CatalogKind::Channels,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Catalog::Movies(items) => items.len(),
            Catalog::Series(items) => items.len(),
            Catalog::Channels(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub valid: bool,
    pub item_count: usize,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub movies: usize,
    pub series: usize,
    pub channels: usize,
}
