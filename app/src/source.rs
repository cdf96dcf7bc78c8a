use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Config, KindLocations};
use crate::error::IngestError;
use crate::models::{CatalogKind, SourceCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceDescriptor {
    kind: SourceKind,
    location: String,
}

impl SourceDescriptor {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Local,
            location: path.into(),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Remote,
            location: url.into(),
        }
    }

    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::remote(location)
        } else {
            Self::local(location)
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SourceKind::Local => write!(f, "local:{}", self.location),
            SourceKind::Remote => write!(f, "remote:{}", self.location),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceList {
    pub structured: Vec<SourceDescriptor>,
    pub playlists: Vec<SourceDescriptor>,
}

impl SourceList {
    pub fn len(&self) -> usize {
        self.structured.len() + self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSet {
    pub movies: SourceList,
    pub series: SourceList,
    pub channels: SourceList,
}

impl SourceSet {
    pub fn get(&self, kind: CatalogKind) -> &SourceList {
        match kind {
            CatalogKind::Movies => &self.movies,
            CatalogKind::Series => &self.series,
            CatalogKind::Channels => &self.channels,
        }
    }

    pub fn counts(&self) -> SourceCounts {
        SourceCounts {
            movies: self.movies.len(),
            series: self.series.len(),
            channels: self.channels.len(),
        }
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<String, IngestError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, IngestError> {
        debug!("Fetching remote source: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::unreachable(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::unreachable(url, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| IngestError::unreachable(url, e))
    }

    async fn fetch_local(&self, path: &str) -> Result<String, IngestError> {
        debug!("Reading local source: {}", path);

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(IngestError::SourceNotFound {
                location: path.to_string(),
            }),
            Err(e) => Err(IngestError::unreachable(path, e)),
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<String, IngestError> {
        match source.kind() {
            SourceKind::Local => self.fetch_local(source.location()).await,
            SourceKind::Remote => self.fetch_remote(source.location()).await,
        }
    }
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn load(&self) -> SourceSet;
}

#[derive(Debug, Clone, Default)]
pub struct StaticSourceProvider {
    set: SourceSet,
}

impl StaticSourceProvider {
    pub fn new(set: SourceSet) -> Self {
        Self { set }
    }
}

#[async_trait]
impl SourceProvider for StaticSourceProvider {
    async fn load(&self) -> SourceSet {
        self.set.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
struct JsonManifest {
    #[serde(default)]
    movie_sources: Vec<String>,
    #[serde(default)]
    series_sources: Vec<String>,
    #[serde(default)]
    channel_sources: Vec<String>,
}

pub struct ManifestSourceProvider {
    manifests: Vec<SourceDescriptor>,
    configured: KindLocations,
    playlists: KindLocations,
    fetcher: Arc<dyn SourceFetcher>,
}

impl ManifestSourceProvider {
    pub fn new(
        manifests: Vec<SourceDescriptor>,
        configured: KindLocations,
        playlists: KindLocations,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            manifests,
            configured,
            playlists,
            fetcher,
        }
    }

    pub fn from_config(config: &Config, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self::new(
            config
                .source_manifests
                .iter()
                .map(|m| SourceDescriptor::parse(m))
                .collect(),
            config.sources.clone(),
            config.playlists.clone(),
            fetcher,
        )
    }

    async fn manifest_locations(&self) -> KindLocations {
        for manifest in &self.manifests {
            match self.fetcher.fetch(manifest).await {
                Ok(body) => match parse_manifest(&body) {
                    Some(locations) => {
                        info!(
                            "Loaded manifest {}: {} movies, {} series, {} channels",
                            manifest,
                            locations.movies.len(),
                            locations.series.len(),
                            locations.channels.len()
                        );
                        return locations;
                    }
                    None => warn!("Manifest {} lists no sources, trying next", manifest),
                },
                Err(e) => warn!("Manifest {} failed: {}", manifest, e),
            }
        }

        if !self.manifests.is_empty() {
            warn!("Could not load any sources from the configured manifests");
        }
        KindLocations::default()
    }
}

#[async_trait]
impl SourceProvider for ManifestSourceProvider {
    async fn load(&self) -> SourceSet {
        let manifest = self.manifest_locations().await;

        let structured = |from_manifest: &[String], configured: &[String]| {
            from_manifest
                .iter()
                .chain(configured)
                .map(|l| SourceDescriptor::parse(l))
                .collect::<Vec<_>>()
        };
        let playlists = |locations: &[String]| {
            locations
                .iter()
                .map(|l| SourceDescriptor::parse(l))
                .collect::<Vec<_>>()
        };

        SourceSet {
            movies: SourceList {
                structured: structured(&manifest.movies, &self.configured.movies),
                playlists: playlists(&self.playlists.movies),
            },
            series: SourceList {
                structured: structured(&manifest.series, &self.configured.series),
                playlists: playlists(&self.playlists.series),
            },
            channels: SourceList {
                structured: structured(&manifest.channels, &self.configured.channels),
                playlists: playlists(&self.playlists.channels),
            },
        }
    }
}

pub fn parse_manifest(body: &str) -> Option<KindLocations> {
    let locations = match serde_json::from_str::<JsonManifest>(body) {
        Ok(json) => KindLocations {
            movies: json.movie_sources,
            series: json.series_sources,
            channels: json.channel_sources,
        },
        Err(_) => parse_text_manifest(body),
    };

    let empty = locations.movies.is_empty()
        && locations.series.is_empty()
        && locations.channels.is_empty();
    (!empty).then_some(locations)
}

fn parse_text_manifest(body: &str) -> KindLocations {
    let mut locations = KindLocations::default();
    let mut section: Option<CatalogKind> = None;

    for line in body.lines() {
        let line = line.trim();
        let upper = line.to_uppercase();

        if upper.contains("MOVIE SOURCES") {
            section = Some(CatalogKind::Movies);
            continue;
        } else if upper.contains("SERIES") && upper.contains("SOURCES") {
            section = Some(CatalogKind::Series);
            continue;
        } else if upper.contains("CHANNEL SOURCES") {
            section = Some(CatalogKind::Channels);
            continue;
        }

        if !line.starts_with("http") {
            continue;
        }
        match section {
            Some(CatalogKind::Movies) => locations.movies.push(line.to_string()),
            Some(CatalogKind::Series) => locations.series.push(line.to_string()),
            Some(CatalogKind::Channels) => locations.channels.push(line.to_string()),
            None => {}
        }
    }

    locations
}

pub struct SourceRegistry {
    provider: Box<dyn SourceProvider>,
    current: RwLock<Arc<SourceSet>>,
}

impl SourceRegistry {
    pub async fn load(provider: Box<dyn SourceProvider>) -> Self {
        let set = provider.load().await;
        let counts = set.counts();
        info!(
            "Sources loaded: {} movies, {} series, {} channels",
            counts.movies, counts.series, counts.channels
        );
        Self {
            provider,
            current: RwLock::new(Arc::new(set)),
        }
    }

    pub async fn list_sources(&self, kind: CatalogKind) -> SourceList {
        self.current.read().await.get(kind).clone()
    }

    pub async fn reload(&self) -> SourceCounts {
        let set = Arc::new(self.provider.load().await);
        let counts = set.counts();
        *self.current.write().await = set;
        info!(
            "Sources reloaded: {} movies, {} series, {} channels",
            counts.movies, counts.series, counts.channels
        );
        counts
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryFetcher {
        bodies: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MemoryFetcher {
        pub(crate) fn with(entries: &[(&str, &str)]) -> Self {
            let fetcher = Self::default();
            for (location, body) in entries {
                fetcher.insert(location, body);
            }
            fetcher
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn insert(&self, location: &str, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(location.to_string(), body.to_string());
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceFetcher for MemoryFetcher {
        async fn fetch(&self, source: &SourceDescriptor) -> Result<String, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let body = self.bodies.lock().unwrap().get(source.location()).cloned();
            body.ok_or_else(|| IngestError::SourceNotFound {
                location: source.location().to_string(),
            })
        }
    }

    #[test]
    fn test_descriptor_parse_tags_scheme() {
        assert_eq!(
            SourceDescriptor::parse("HTTPS://example.com/a.json").kind(),
            SourceKind::Remote
        );
        assert_eq!(SourceDescriptor::parse("data/a.json").kind(), SourceKind::Local);
        assert_eq!(
            SourceDescriptor::parse(" data/a.json ").to_string(),
            "local:data/a.json"
        );
    }

    #[test]
    fn test_json_manifest() {
        let body = r#"{"movie_sources": ["https://a/m.json"], "channel_sources": ["https://a/c.json"]}"#;
        let locations = parse_manifest(body).unwrap();
        assert_eq!(locations.movies, vec!["https://a/m.json"]);
        assert!(locations.series.is_empty());
        assert_eq!(locations.channels, vec!["https://a/c.json"]);
    }

    #[test]
    fn test_text_manifest_sections() {
        let body = "
=== MOVIE SOURCES ===
https://a/action.json
not a url
=== Series Sources ===
https://a/drama.json
https://a/kids.json
=== CHANNEL SOURCES ===
https://a/live.json
";
        let locations = parse_manifest(body).unwrap();
        assert_eq!(locations.movies, vec!["https://a/action.json"]);
        assert_eq!(locations.series.len(), 2);
        assert_eq!(locations.channels, vec!["https://a/live.json"]);
    }

    #[test]
    fn test_empty_manifest_is_rejected() {
        assert!(parse_manifest("{}").is_none());
        assert!(parse_manifest("nothing here").is_none());
    }

    #[tokio::test]
    async fn test_manifest_provider_falls_back_to_second_manifest() {
        let fetcher = Arc::new(MemoryFetcher::with(&[(
            "https://cfg/sources.txt",
            "MOVIE SOURCES\nhttps://a/m.json\n",
        )]));
        let provider = ManifestSourceProvider::new(
            vec![
                SourceDescriptor::parse("https://cfg/sources.json"),
                SourceDescriptor::parse("https://cfg/sources.txt"),
            ],
            KindLocations {
                movies: vec!["local/extra.json".to_string()],
                ..Default::default()
            },
            KindLocations {
                channels: vec!["live.m3u".to_string()],
                ..Default::default()
            },
            fetcher.clone(),
        );

        let set = provider.load().await;
        assert_eq!(
            set.movies.structured,
            vec![
                SourceDescriptor::remote("https://a/m.json"),
                SourceDescriptor::local("local/extra.json"),
            ]
        );
        assert_eq!(set.channels.playlists, vec![SourceDescriptor::local("live.m3u")]);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_local_fetch_reports_missing_file() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher
            .fetch(&SourceDescriptor::local("/definitely/not/here.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_local_fetch_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.json");
        std::fs::write(&path, "[]").unwrap();

        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let body = fetcher
            .fetch(&SourceDescriptor::local(path.to_string_lossy()))
            .await
            .unwrap();
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn test_local_fetch_keeps_non_utf8_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.m3u");
        let mut content = b"#EXTM3U\n#EXTINF:-1 group-title=\"News\",T".to_vec();
        content.push(0xE9);
        content.extend_from_slice(b"l\xE9 Info\nhttp://x/1\n#EXTINF:-1,Sport\nhttp://x/2\n");
        std::fs::write(&path, content).unwrap();

        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let body = fetcher
            .fetch(&SourceDescriptor::local(path.to_string_lossy()))
            .await
            .unwrap();

        let channels = crate::m3u::parse_channels(&body, &mut 1);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "T\u{FFFD}l\u{FFFD} Info");
        assert_eq!(channels[1].name, "Sport");
    }

    #[tokio::test]
    async fn test_remote_fetch_treats_error_status_as_unreachable() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.m3u"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let ok = fetcher
            .fetch(&SourceDescriptor::remote(format!("{}/ok.m3u", server.uri())))
            .await
            .unwrap();
        assert_eq!(ok, "#EXTM3U\n");

        let err = fetcher
            .fetch(&SourceDescriptor::remote(format!("{}/gone.json", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_registry_reload_swaps_set() {
        let registry = SourceRegistry::load(Box::new(StaticSourceProvider::new(SourceSet {
            series: SourceList {
                structured: vec![SourceDescriptor::local("s.json")],
                playlists: vec![SourceDescriptor::local("s.m3u")],
            },
            ..Default::default()
        })))
        .await;

        let list = registry.list_sources(CatalogKind::Series).await;
        assert_eq!(list.len(), 2);

        let counts = registry.reload().await;
        assert_eq!(counts, SourceCounts { movies: 0, series: 2, channels: 0 });
    }
}
