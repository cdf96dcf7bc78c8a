use std::time::Duration;

use config::{Config as ConfigBuilder, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct KindLocations {
    pub movies: Vec<String>,
    pub series: Vec<String>,
    pub channels: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub port: u16,
    pub tmdb_api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub enrichment_timeout_secs: u64,
    pub default_country: String,
    pub source_manifests: Vec<String>,
    pub sources: KindLocations,
    /// M3U playlists; `channels` is read from the `live` key.
    pub playlists: KindLocations,
}

impl Config {
    pub fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = ConfigBuilder::builder()
            .add_source(File::with_name("config").required(false))
            .set_default("port", 3000u16)?
            .set_default("cache_ttl_secs", 60u64)?
            .set_default("fetch_timeout_secs", 20u64)?
            .set_default("enrichment_timeout_secs", 5u64)?
            .set_default("default_country", "")?
            .build()?;

        let list = |key: &str| config.get::<Vec<String>>(key).unwrap_or_default();

        let source_manifests = match std::env::var("SOURCE_MANIFESTS") {
            Ok(raw) => split_list(&raw),
            Err(_) => list("source_manifests"),
        };

        Ok(Config {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| config.get_int("port").unwrap_or(3000) as u16),
            tmdb_api_key: std::env::var("TMDB_API_KEY")
                .ok()
                .or_else(|| config.get_string("tmdb_api_key").ok())
                .filter(|key| !key.trim().is_empty()),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| config.get_int("cache_ttl_secs").unwrap_or(60) as u64),
            fetch_timeout_secs: config.get_int("fetch_timeout_secs").unwrap_or(20) as u64,
            enrichment_timeout_secs: config.get_int("enrichment_timeout_secs").unwrap_or(5) as u64,
            default_country: config.get_string("default_country").unwrap_or_default(),
            source_manifests,
            sources: KindLocations {
                movies: list("sources.movies"),
                series: list("sources.series"),
                channels: list("sources.channels"),
            },
            playlists: KindLocations {
                movies: list("playlists.movies"),
                series: list("playlists.series"),
                channels: list("playlists.live"),
            },
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(
            split_list(" https://a/x.json, ,local.txt,"),
            vec!["https://a/x.json".to_string(), "local.txt".to_string()]
        );
    }
}
