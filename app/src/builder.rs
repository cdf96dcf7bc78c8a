use std::collections::{BTreeMap, BTreeSet};

use crate::document::{ChannelItem, EpisodeItem, ItemDetails, MovieItem, SeriesItem};
use crate::models::{Channel, Episode, Movie, Season, Series};
use crate::normalize::{first_present, rating_5based, resolve_year};

const UNRATED: &str = "0.0";

#[derive(Debug, Clone, Default)]
pub struct BuildDefaults {
    pub country: String,
}

pub fn episode_id(series_id: i64, season: u32, number: u32) -> i64 {
    series_id * 10_000 + i64::from(season) * 100 + i64::from(number)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeDraft {
    pub cuid: Option<i64>,
    pub season: u32,
    pub episode: Option<u32>,
    pub title: String,
    pub plot: String,
    pub thumbnail_url: String,
    pub playback_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesDraft {
    pub title: String,
    pub plot: String,
    pub cover_url: String,
    pub banner_url: String,
    pub year: String,
    pub genres: Vec<String>,
    pub cast: Vec<String>,
    pub director: String,
    pub rating: String,
    pub category: String,
    pub external_metadata_id: Option<String>,
    pub episodes: Vec<EpisodeDraft>,
}

impl SeriesDraft {
    pub fn into_series(self, id: i64) -> Series {
        Series {
            id,
            rating_5based: rating_5based(&self.rating),
            seasons: structure_seasons(id, self.episodes),
            title: self.title,
            plot: self.plot,
            cover_url: self.cover_url,
            banner_url: self.banner_url,
            year: self.year,
            genres: self.genres,
            cast: self.cast,
            director: self.director,
            rating: self.rating,
            category: self.category,
            external_metadata_id: self.external_metadata_id,
        }
    }
}

/// Buckets episodes by season and orders both levels ascending.
///
/// An episode without a number takes its 1-based arrival position within the
/// season, or the next number no other episode of that season claims.
pub fn structure_seasons(series_id: i64, episodes: Vec<EpisodeDraft>) -> Vec<Season> {
    let mut taken: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for draft in &episodes {
        if let Some(number) = draft.episode {
            taken.entry(draft.season).or_default().insert(number);
        }
    }

    let mut seasons: BTreeMap<u32, Vec<Episode>> = BTreeMap::new();
    for draft in episodes {
        let bucket = seasons.entry(draft.season).or_default();
        let number = match draft.episode {
            Some(number) => number,
            None => {
                let used = taken.entry(draft.season).or_default();
                let mut number = u32::try_from(bucket.len() + 1).unwrap_or(u32::MAX);
                while !used.insert(number) && number < u32::MAX {
                    number += 1;
                }
                number
            }
        };
        bucket.push(Episode {
            id: draft
                .cuid
                .unwrap_or_else(|| episode_id(series_id, draft.season, number)),
            episode_number: number,
            title: draft.title,
            plot: draft.plot,
            thumbnail_url: draft.thumbnail_url,
            playback_url: draft.playback_url,
        });
    }

    seasons
        .into_iter()
        .map(|(season_number, mut episodes)| {
            episodes.sort_by_key(|e| e.episode_number);
            Season {
                season_number,
                episode_count: episodes.len(),
                episodes,
            }
        })
        .collect()
}

fn resolved_category(details: &ItemDetails, document_category: &str) -> String {
    details
        .category
        .clone()
        .unwrap_or_else(|| document_category.to_string())
}

fn genres_or_category(genres: Vec<String>, category: &str) -> Vec<String> {
    if genres.is_empty() && !category.is_empty() {
        vec![category.to_string()]
    } else {
        genres
    }
}

pub fn build_movie(
    id: i64,
    item: MovieItem,
    document_category: &str,
    defaults: &BuildDefaults,
) -> Movie {
    let details = item.details;
    let category = resolved_category(&details, document_category);

    let title = details.title.clone().unwrap_or_else(|| "Untitled".to_string());
    let cover = first_present([details.vertical_image.as_deref(), details.poster_image.as_deref()])
        .unwrap_or_default();
    let banner = first_present([details.poster_image.as_deref(), details.vertical_image.as_deref()])
        .unwrap_or_else(|| cover.clone());
    let rating = details.rating.clone().unwrap_or_else(|| UNRATED.to_string());

    Movie {
        id,
        year: resolve_year(details.year.as_deref(), &title),
        plot: first_present([details.synopsis.as_deref(), details.overview.as_deref()])
            .unwrap_or_else(|| "No description available.".to_string()),
        genres: genres_or_category(details.genres, &category),
        cast: details.cast,
        director: details.director.unwrap_or_else(|| "Unknown".to_string()),
        rating_5based: rating_5based(&rating),
        rating,
        duration: details.duration.unwrap_or_default(),
        country: details.country.unwrap_or_else(|| defaults.country.clone()),
        playback_url: item.stream_url.unwrap_or_default(),
        external_metadata_id: details.external_id,
        cover_url: cover,
        banner_url: banner,
        title,
        category,
    }
}

fn episode_draft(item: EpisodeItem, series_banner: &str) -> EpisodeDraft {
    let title = item.title.unwrap_or_else(|| match item.episode {
        Some(n) => format!("Episode {}", n),
        None => "Episode ?".to_string(),
    });

    EpisodeDraft {
        cuid: item.cuid,
        season: item.season.unwrap_or(1),
        episode: item.episode,
        title,
        plot: item.overview.unwrap_or_default(),
        thumbnail_url: item.image.unwrap_or_else(|| series_banner.to_string()),
        playback_url: item.stream_url.unwrap_or_default(),
    }
}

pub fn series_title(details: &ItemDetails) -> String {
    details
        .title
        .clone()
        .unwrap_or_else(|| "Unknown Series".to_string())
}

pub fn series_draft(item: SeriesItem, document_category: &str) -> SeriesDraft {
    let details = item.details;
    let category = resolved_category(&details, document_category);
    let title = series_title(&details);
    let banner = details.poster_image.clone().unwrap_or_default();

    let episodes = item
        .episodes
        .into_iter()
        .map(|ep| episode_draft(ep, &banner))
        .collect();

    SeriesDraft {
        year: resolve_year(details.year.as_deref(), &title),
        plot: first_present([details.synopsis.as_deref(), details.overview.as_deref()])
            .unwrap_or_default(),
        cover_url: details.vertical_image.unwrap_or_default(),
        banner_url: banner,
        genres: genres_or_category(details.genres, &category),
        cast: details.cast,
        director: details.director.unwrap_or_default(),
        rating: details.rating.unwrap_or_else(|| UNRATED.to_string()),
        external_metadata_id: details.external_id,
        episodes,
        title,
        category,
    }
}

pub fn build_channel(id: i64, item: ChannelItem, document_category: &str) -> Channel {
    Channel {
        id,
        name: item.name.unwrap_or_else(|| "Unknown Channel".to_string()),
        logo_url: item.logo.unwrap_or_default(),
        playback_url: item.stream_url.unwrap_or_default(),
        category: item
            .category
            .unwrap_or_else(|| document_category.to_string()),
        epg_channel_id: item.epg_channel_id.unwrap_or_default(),
        channel_number: String::new(),
        added: item.added.unwrap_or_default(),
        category_id: item.category_id.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{classify, RawItem};
    use serde_json::json;

    fn draft(season: u32, episode: Option<u32>, cuid: Option<i64>) -> EpisodeDraft {
        EpisodeDraft {
            cuid,
            season,
            episode,
            title: String::new(),
            plot: String::new(),
            thumbnail_url: String::new(),
            playback_url: String::new(),
        }
    }

    #[test]
    fn test_derived_episode_id() {
        assert_eq!(episode_id(10_000, 1, 5), 100_000_105);

        let seasons = structure_seasons(10_000, vec![draft(1, Some(5), None)]);
        assert_eq!(seasons[0].episodes[0].id, 100_000_105);
    }

    #[test]
    fn test_seasons_sorted_and_positional_numbers() {
        let seasons = structure_seasons(
            10_001,
            vec![
                draft(2, Some(3), None),
                draft(1, None, None),
                draft(2, Some(1), Some(999)),
                draft(1, None, None),
            ],
        );

        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[0].season_number, 1);
        assert_eq!(seasons[0].episode_count, 2);
        assert_eq!(seasons[0].episodes[0].episode_number, 1);
        assert_eq!(seasons[0].episodes[1].id, episode_id(10_001, 1, 2));

        assert_eq!(seasons[1].season_number, 2);
        assert_eq!(seasons[1].episodes[0].id, 999);
        assert_eq!(seasons[1].episodes[1].episode_number, 3);
    }

    #[test]
    fn test_movie_fallbacks() {
        let RawItem::Movie(item) = classify(&json!({
            "Name": "Casablanca (1942)",
            "PosterImage": "http://img/wide.jpg",
            "Movie": {"CUID": "8"}
        })) else {
            panic!("expected a movie");
        };

        let defaults = BuildDefaults {
            country: "Morocco".to_string(),
        };
        let movie = build_movie(8, item, "Classics", &defaults);
        assert_eq!(movie.title, "Casablanca (1942)");
        assert_eq!(movie.year, "1942");
        assert_eq!(movie.plot, "No description available.");
        assert_eq!(movie.cover_url, "http://img/wide.jpg");
        assert_eq!(movie.banner_url, "http://img/wide.jpg");
        assert_eq!(movie.genres, vec!["Classics"]);
        assert_eq!(movie.director, "Unknown");
        assert_eq!(movie.rating, "0.0");
        assert_eq!(movie.rating_5based, "0.0");
        assert_eq!(movie.country, "Morocco");
        assert_eq!(movie.category, "Classics");
    }

    #[test]
    fn test_item_category_beats_document_category() {
        let RawItem::Movie(item) = classify(&json!({
            "Title": "X",
            "Category": "war_films",
            "Info": {"Rating": "8.4"},
            "Movie": {"CUID": 1}
        })) else {
            panic!("expected a movie");
        };
        let movie = build_movie(1, item, "General", &BuildDefaults::default());
        assert_eq!(movie.category, "War Films");
        assert_eq!(movie.genres, vec!["War Films"]);
        assert_eq!(movie.rating_5based, "4.2");
    }

    #[test]
    fn test_series_draft_episode_defaults() {
        let RawItem::Series(item) = classify(&json!({
            "Title": "Show",
            "PosterImage": "http://img/banner.jpg",
            "Episodes": [
                {"Episode": "E02", "Season": "S01", "streamUrl": "http://x/2"},
                {"Season": "S01", "Episode_Title": "Pilot"}
            ]
        })) else {
            panic!("expected a series");
        };

        let series = series_draft(item, "Drama").into_series(10_000);
        assert_eq!(series.category, "Drama");
        assert_eq!(series.seasons.len(), 1);

        let episodes = &series.seasons[0].episodes;
        assert_eq!(episodes[0].episode_number, 2);
        assert_eq!(episodes[0].title, "Episode 2");
        assert_eq!(episodes[0].thumbnail_url, "http://img/banner.jpg");
        assert_eq!(episodes[0].id, 100_000_102);
        assert_eq!(episodes[1].title, "Pilot");
        assert_eq!(episodes[1].episode_number, 3);
        assert_eq!(episodes[1].id, 100_000_103);
    }

    fn titled_draft(episode: Option<u32>, title: &str) -> EpisodeDraft {
        EpisodeDraft {
            cuid: None,
            season: 1,
            episode,
            title: title.to_string(),
            plot: String::new(),
            thumbnail_url: String::new(),
            playback_url: String::new(),
        }
    }

    #[test]
    fn test_unnumbered_episode_skips_claimed_numbers() {
        let seasons = structure_seasons(
            7,
            vec![titled_draft(None, "Intro"), titled_draft(Some(1), "First"), titled_draft(Some(2), "Second"), titled_draft(None, "Extra")],
        );

        let episodes = &seasons[0].episodes;
        let numbers: Vec<(u32, &str)> = episodes
            .iter()
            .map(|e| (e.episode_number, e.title.as_str()))
            .collect();
        assert_eq!(numbers, vec![(1, "First"), (2, "Second"), (3, "Intro"), (4, "Extra")]);

        let mut ids: Vec<i64> = episodes.iter().map(|e| e.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_channel_defaults() {
        let RawItem::Channel(item) = classify(&json!({"url": "http://x/c"})) else {
            panic!("expected a channel");
        };
        let channel = build_channel(3, item, "Live Tv");
        assert_eq!(channel.name, "Unknown Channel");
        assert_eq!(channel.category, "Live Tv");
        assert_eq!(channel.playback_url, "http://x/c");
    }
}
