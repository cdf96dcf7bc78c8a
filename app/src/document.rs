use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::IngestError;
use crate::models::CatalogKind;
use crate::normalize::{self, value_text};
use crate::source::SourceDescriptor;

static EPISODE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)E(\d+)").unwrap());
static SEASON_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)S(\d+)").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDetails {
    pub title: Option<String>,
    pub synopsis: Option<String>,
    pub overview: Option<String>,
    pub vertical_image: Option<String>,
    pub poster_image: Option<String>,
    pub category: Option<String>,
    pub year: Option<String>,
    pub genres: Vec<String>,
    pub cast: Vec<String>,
    pub director: Option<String>,
    pub rating: Option<String>,
    pub duration: Option<String>,
    pub country: Option<String>,
    pub external_id: Option<String>,
}

impl ItemDetails {
    pub fn needs_enrichment(&self) -> bool {
        self.external_id.is_some()
            && (self.year.is_none() || self.genres.is_empty() || self.rating.is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovieItem {
    pub content_id: Option<i64>,
    pub stream_url: Option<String>,
    pub details: ItemDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeItem {
    pub cuid: Option<i64>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub image: Option<String>,
    pub stream_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesItem {
    pub details: ItemDetails,
    pub episodes: Vec<EpisodeItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelItem {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub logo: Option<String>,
    pub stream_url: Option<String>,
    pub category: Option<String>,
    pub epg_channel_id: Option<String>,
    pub added: Option<String>,
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Movie(MovieItem),
    Series(SeriesItem),
    Channel(ChannelItem),
    Unrecognized,
}

impl RawItem {
    pub fn kind(&self) -> Option<CatalogKind> {
        match self {
            RawItem::Movie(_) => Some(CatalogKind::Movies),
            RawItem::Series(_) => Some(CatalogKind::Series),
            RawItem::Channel(_) => Some(CatalogKind::Channels),
            RawItem::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub category: String,
    pub items: Vec<RawItem>,
}

pub fn parse_document(
    source: &SourceDescriptor,
    body: &str,
    kind: CatalogKind,
) -> Result<ParsedDocument, IngestError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| IngestError::malformed(source.location(), e))?;

    let list = match &root {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => envelope_items(map, kind),
        _ => {
            return Err(IngestError::malformed(
                source.location(),
                "expected a list of items or an object envelope",
            ))
        }
    };

    let category = document_category(source, &root);
    let total = list.len();
    let items: Vec<RawItem> = list
        .iter()
        .map(classify)
        .filter(|item| item.kind() == Some(kind))
        .collect();

    if items.len() < total {
        debug!(
            "Skipped {} of {} items in {} that are not {}",
            total - items.len(),
            total,
            source,
            kind
        );
    }

    Ok(ParsedDocument { category, items })
}

fn envelope_items(map: &Map<String, Value>, kind: CatalogKind) -> &[Value] {
    let keys: &[&str] = match kind {
        CatalogKind::Movies => &["movies", "data"],
        CatalogKind::Series => &["series", "data"],
        CatalogKind::Channels => &["channels"],
    };
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn document_category(source: &SourceDescriptor, root: &Value) -> String {
    let explicit = match root {
        Value::Object(map) => map.get("Category").and_then(value_text),
        Value::Array(items) => items
            .first()
            .and_then(|first| first.get("Category"))
            .and_then(value_text),
        _ => None,
    };

    let from_channels = || {
        root.get("channels")
            .and_then(Value::as_array)
            .and_then(|channels| channels.first())
            .and_then(|first| first.get("category"))
            .and_then(value_text)
    };

    match explicit.or_else(from_channels) {
        Some(name) => normalize::clean_category_name(&name),
        None => normalize::category_from_location(source.location()),
    }
}

pub fn classify(value: &Value) -> RawItem {
    let Some(obj) = value.as_object() else {
        return RawItem::Unrecognized;
    };

    let has_movie = obj.contains_key("Movie");
    let has_episodes_key = obj.contains_key("Episodes");
    let has_episodes = obj
        .get("Episodes")
        .and_then(Value::as_array)
        .map(|eps| !eps.is_empty())
        .unwrap_or(false);

    if has_movie && !has_episodes_key {
        return RawItem::Movie(movie_item(obj));
    }
    if has_episodes && !has_movie {
        return RawItem::Series(series_item(obj));
    }
    if !has_movie && !has_episodes_key && looks_like_channel(obj) {
        return RawItem::Channel(channel_item(obj));
    }
    RawItem::Unrecognized
}

fn looks_like_channel(obj: &Map<String, Value>) -> bool {
    ["name", "channel_name", "url", "stream_url"]
        .iter()
        .any(|key| obj.contains_key(*key))
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(value_text)
}

fn text_any(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(obj, key))
}

fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn sub_object<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}

fn details(obj: &Map<String, Value>) -> ItemDetails {
    let empty = Map::new();
    let info = sub_object(obj, "Info").unwrap_or(&empty);

    ItemDetails {
        title: text_any(obj, &["Title", "Name"]),
        synopsis: text(obj, "Synopsis"),
        overview: text(info, "Overview"),
        vertical_image: text(obj, "VerticalImage"),
        poster_image: text(obj, "PosterImage"),
        category: text(obj, "Category").map(|c| normalize::clean_category_name(&c)),
        year: text(info, "Year"),
        genres: normalize::normalize_genres(info.get("Genres").or_else(|| info.get("Genre"))),
        cast: normalize::clean_cast(info.get("Cast").or_else(|| info.get("Actors"))),
        director: text(info, "Director"),
        rating: text(info, "Rating"),
        duration: text(info, "Duration"),
        country: text(info, "Country"),
        external_id: text(info, "tmdb_id"),
    }
}

fn movie_item(obj: &Map<String, Value>) -> MovieItem {
    let empty = Map::new();
    let movie = sub_object(obj, "Movie").unwrap_or(&empty);
    let info = sub_object(obj, "Info").unwrap_or(&empty);

    let content_id = [movie.get("CUID"), info.get("CUID"), obj.get("CUID")]
        .into_iter()
        .flatten()
        .find(|v| value_text(v).is_some())
        .and_then(numeric_id);

    MovieItem {
        content_id,
        stream_url: text(movie, "streamUrl").or_else(|| text_any(info, &["streamUrl", "stream_url"])),
        details: details(obj),
    }
}

fn series_item(obj: &Map<String, Value>) -> SeriesItem {
    let episodes = obj
        .get("Episodes")
        .and_then(Value::as_array)
        .map(|eps| eps.iter().filter_map(Value::as_object).map(episode_item).collect())
        .unwrap_or_default();

    SeriesItem {
        details: details(obj),
        episodes,
    }
}

fn marker_number(value: Option<&Value>, marker: &Regex) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse().ok();
            }
            marker
                .captures(s)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        }
        _ => None,
    }
}

fn episode_item(obj: &Map<String, Value>) -> EpisodeItem {
    EpisodeItem {
        cuid: obj.get("CUID").and_then(numeric_id),
        season: marker_number(obj.get("Season"), &SEASON_NUMBER),
        episode: marker_number(obj.get("Episode"), &EPISODE_NUMBER),
        title: text(obj, "Episode_Title"),
        overview: text_any(obj, &["Episode_Overview", "plot"]),
        image: text(obj, "imageUrl"),
        stream_url: text(obj, "streamUrl"),
    }
}

fn channel_item(obj: &Map<String, Value>) -> ChannelItem {
    ChannelItem {
        id: ["id", "stream_id"]
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(numeric_id),
        name: text_any(obj, &["name", "channel_name"]),
        logo: text_any(obj, &["logo", "stream_icon"]),
        stream_url: text_any(obj, &["stream_url", "url"]),
        category: text_any(obj, &["category", "category_name"])
            .map(|c| normalize::clean_category_name(&c)),
        epg_channel_id: text(obj, "epg_channel_id"),
        added: text(obj, "added"),
        category_id: text(obj, "category_id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(location: &str) -> SourceDescriptor {
        SourceDescriptor::parse(location)
    }

    #[test]
    fn test_classification_is_exclusive() {
        let movie = json!({"Title": "A", "Movie": {"CUID": "1"}});
        let series = json!({"Title": "B", "Episodes": [{"Episode": "E01"}]});
        let both = json!({"Title": "C", "Movie": {}, "Episodes": [{"Episode": "E01"}]});
        let empty_series = json!({"Title": "D", "Episodes": []});
        let channel = json!({"name": "E", "url": "http://x/e"});

        assert!(matches!(classify(&movie), RawItem::Movie(_)));
        assert!(matches!(classify(&series), RawItem::Series(_)));
        assert_eq!(classify(&both), RawItem::Unrecognized);
        assert_eq!(classify(&empty_series), RawItem::Unrecognized);
        assert!(matches!(classify(&channel), RawItem::Channel(_)));
        assert_eq!(classify(&json!("just a string")), RawItem::Unrecognized);
    }

    #[test]
    fn test_movie_fields_and_cuid_order() {
        let item = json!({
            "Title": " The Message ",
            "CUID": "3",
            "Info": {"CUID": 2, "Year": 1976, "Genres": "Drama, History", "Rating": 8.1, "tmdb_id": 12345},
            "Movie": {"streamUrl": "http://x/m.mp4"}
        });
        let RawItem::Movie(movie) = classify(&item) else {
            panic!("expected a movie");
        };
        assert_eq!(movie.content_id, Some(2));
        assert_eq!(movie.stream_url.as_deref(), Some("http://x/m.mp4"));
        assert_eq!(movie.details.title.as_deref(), Some("The Message"));
        assert_eq!(movie.details.year.as_deref(), Some("1976"));
        assert_eq!(movie.details.genres, vec!["Drama", "History"]);
        assert_eq!(movie.details.rating.as_deref(), Some("8.1"));
        assert_eq!(movie.details.external_id.as_deref(), Some("12345"));
    }

    #[test]
    fn test_non_numeric_cuid_leaves_no_id() {
        let RawItem::Movie(movie) = classify(&json!({"Movie": {"CUID": "abc"}})) else {
            panic!("expected a movie");
        };
        assert_eq!(movie.content_id, None);
    }

    #[test]
    fn test_episode_markers() {
        let RawItem::Series(series) = classify(&json!({
            "Title": "Show",
            "Episodes": [
                {"Episode": "E05", "Season": "S02", "CUID": "77"},
                {"Episode": 3},
                {"Episode": "Finale"}
            ]
        })) else {
            panic!("expected a series");
        };
        assert_eq!(series.episodes[0].episode, Some(5));
        assert_eq!(series.episodes[0].season, Some(2));
        assert_eq!(series.episodes[0].cuid, Some(77));
        assert_eq!(series.episodes[1].episode, Some(3));
        assert_eq!(series.episodes[1].season, None);
        assert_eq!(series.episodes[2].episode, None);
    }

    #[test]
    fn test_envelope_keys_per_kind() {
        let body = r#"{"data": [{"Title": "A", "Movie": {"CUID": 1}}, {"Title": "S", "Episodes": [{}]}]}"#;
        let movies = parse_document(&source("m.json"), body, CatalogKind::Movies).unwrap();
        assert_eq!(movies.items.len(), 1);
        let series = parse_document(&source("m.json"), body, CatalogKind::Series).unwrap();
        assert_eq!(series.items.len(), 1);
        let channels = parse_document(&source("m.json"), body, CatalogKind::Channels).unwrap();
        assert!(channels.items.is_empty());
    }

    #[test]
    fn test_malformed_documents() {
        let err = parse_document(&source("bad.json"), "{not json", CatalogKind::Movies).unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { .. }));
        let err = parse_document(&source("n.json"), "42", CatalogKind::Movies).unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { .. }));
    }

    #[test]
    fn test_category_resolution_order() {
        let explicit = r#"{"Category": "kids_shows", "series": []}"#;
        let doc = parse_document(&source("https://x/any.json"), explicit, CatalogKind::Series).unwrap();
        assert_eq!(doc.category, "Kids Shows");

        let first_item = r#"[{"Category": "classics", "Movie": {"CUID": 1}}]"#;
        let doc = parse_document(&source("https://x/any.json"), first_item, CatalogKind::Movies).unwrap();
        assert_eq!(doc.category, "Classics");

        let channels = r#"{"channels": [{"name": "A", "category": "sports"}]}"#;
        let doc = parse_document(&source("live.json"), channels, CatalogKind::Channels).unwrap();
        assert_eq!(doc.category, "Sports");

        let from_name = r#"[{"Movie": {"CUID": 1}}]"#;
        let doc = parse_document(
            &source("https://cdn.x/sci_fi_movies.json?dl=0"),
            from_name,
            CatalogKind::Movies,
        )
        .unwrap();
        assert_eq!(doc.category, "Sci Fi Movies");
    }

    #[test]
    fn test_channel_item_fields() {
        let RawItem::Channel(ch) = classify(&json!({
            "channel_name": "Al Oula",
            "stream_icon": "http://l/oula.png",
            "url": "http://x/oula.m3u8",
            "category_name": "national_tv",
            "stream_id": "12",
            "epg_channel_id": "oula.ma"
        })) else {
            panic!("expected a channel");
        };
        assert_eq!(ch.id, Some(12));
        assert_eq!(ch.name.as_deref(), Some("Al Oula"));
        assert_eq!(ch.category.as_deref(), Some("National Tv"));
        assert_eq!(ch.epg_channel_id.as_deref(), Some("oula.ma"));
    }
}
