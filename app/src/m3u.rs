use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::builder::{EpisodeDraft, SeriesDraft};
use crate::models::{Channel, Movie};
use crate::normalize::{self, DEFAULT_CATEGORY};

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap());
static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)S(\d+)\s*E(\d+)").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directive {
    attributes: HashMap<String, String>,
    pub name: String,
}

impl Directive {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(&key.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn cuid(&self) -> Option<i64> {
        self.attr("CUID")
            .filter(|v| v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse().ok())
    }

    fn attr_or_empty(&self, key: &str) -> String {
        self.attr(key).unwrap_or_default().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub directive: Directive,
    pub url: String,
}

/// Tokenizes an `#EXTINF` line into `key="value"` attributes and a display name.
///
/// The name is `tvg-name` when present, otherwise whatever follows the last
/// comma after the attribute list.
pub fn parse_directive(line: &str) -> Directive {
    let mut attributes = HashMap::new();
    let mut attrs_end = 0;

    for caps in ATTRIBUTE.captures_iter(line) {
        if let (Some(whole), Some(key), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) {
            attributes
                .entry(key.as_str().to_ascii_lowercase())
                .or_insert_with(|| value.as_str().to_string());
            attrs_end = whole.end();
        }
    }

    let tail = &line[attrs_end..];
    let name = match attributes.get("tvg-name").map(|n| n.trim()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => tail
            .rfind(',')
            .map(|pos| tail[pos + 1..].trim().to_string())
            .unwrap_or_default(),
    };

    Directive { attributes, name }
}

/// Walks the playlist and pairs every directive with the line that follows it.
///
/// Blank lines and `#EXTVLCOPT` options between the two are skipped. Any
/// other comment line drops the pending directive, and a new `#EXTINF`
/// replaces it.
pub fn parse_entries(content: &str) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<Directive> = None;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with("#EXTVLCOPT") {
            continue;
        }
        if line.starts_with("#EXTINF") {
            pending = Some(parse_directive(line));
            continue;
        }
        if line.starts_with('#') {
            pending = None;
            continue;
        }
        if let Some(directive) = pending.take() {
            entries.push(PlaylistEntry {
                directive,
                url: line.to_string(),
            });
        }
    }

    entries
}

pub fn season_episode(name: &str) -> Option<(u32, u32, String)> {
    let caps = SEASON_EPISODE.captures(name)?;
    let season = caps.get(1)?.as_str().parse().ok()?;
    let episode = caps.get(2)?.as_str().parse().ok()?;
    let title = SEASON_EPISODE.replace_all(name, "").trim().to_string();
    Some((season, episode, title))
}

/// Entries without a CUID take `next_id`, which advances once per entry so
/// several playlists can share one counter.
pub fn parse_channels(content: &str, next_id: &mut i64) -> Vec<Channel> {
    parse_entries(content)
        .into_iter()
        .map(|entry| {
            let d = &entry.directive;
            let fallback = *next_id;
            *next_id += 1;
            Channel {
                id: d.cuid().unwrap_or(fallback),
                name: d.name.clone(),
                logo_url: d.attr_or_empty("tvg-logo"),
                playback_url: entry.url.clone(),
                category: d.attr("group-title").unwrap_or(DEFAULT_CATEGORY).to_string(),
                epg_channel_id: d.attr_or_empty("tvg-id"),
                channel_number: d.attr_or_empty("tvg-chno"),
                added: String::new(),
                category_id: String::new(),
            }
        })
        .collect()
}

pub fn parse_movies(content: &str) -> Vec<Movie> {
    parse_entries(content)
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let d = &entry.directive;
            let logo = d.attr_or_empty("tvg-logo");
            let group = d.attr("group-title");
            Movie {
                id: d.cuid().unwrap_or(index as i64 + 1),
                title: d.name.clone(),
                plot: String::new(),
                cover_url: logo.clone(),
                banner_url: logo,
                year: normalize::year_in_title(&d.name).unwrap_or_default(),
                genres: group.map(|g| vec![g.to_string()]).unwrap_or_default(),
                cast: Vec::new(),
                director: String::new(),
                rating: "0.0".to_string(),
                rating_5based: "0.0".to_string(),
                duration: String::new(),
                country: String::new(),
                playback_url: entry.url.clone(),
                category: group.unwrap_or("Movies").to_string(),
                external_metadata_id: None,
            }
        })
        .collect()
}

pub fn parse_series(content: &str) -> Vec<SeriesDraft> {
    let mut drafts: Vec<SeriesDraft> = Vec::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for entry in parse_entries(content) {
        let d = &entry.directive;
        let Some((season, episode, title)) = season_episode(&d.name) else {
            continue;
        };
        let logo = d.attr_or_empty("tvg-logo");

        let index = *by_title.entry(title.clone()).or_insert_with(|| {
            let group = d.attr("group-title");
            drafts.push(SeriesDraft {
                title: title.clone(),
                plot: String::new(),
                cover_url: logo.clone(),
                banner_url: logo.clone(),
                year: String::new(),
                genres: group.map(|g| vec![g.to_string()]).unwrap_or_default(),
                cast: Vec::new(),
                director: String::new(),
                rating: "0.0".to_string(),
                category: group.unwrap_or("Series").to_string(),
                external_metadata_id: None,
                episodes: Vec::new(),
            });
            drafts.len() - 1
        });

        drafts[index].episodes.push(EpisodeDraft {
            cuid: d.cuid(),
            season,
            episode: Some(episode),
            title: d.name.clone(),
            plot: String::new(),
            thumbnail_url: logo,
            playback_url: entry.url.clone(),
        });
    }

    drafts
}
