use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::enrichment::{EnrichmentData, Enricher, LookupKey};
use crate::error::IngestError;
use crate::normalize::decimal_text;

const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
const TOP_CAST: usize = 5;

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: TMDB_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    // v4 read tokens are JWTs and go in a bearer header; v3 keys go in the query.
    fn uses_bearer(&self) -> bool {
        self.api_key.starts_with("Bearer ") || self.api_key.starts_with("eyJ")
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.starts_with("Bearer ") {
            request.header("Authorization", self.api_key.clone())
        } else if self.uses_bearer() {
            request.header("Authorization", format!("Bearer {}", self.api_key))
        } else {
            request.query(&[("api_key", self.api_key.as_str())])
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, IngestError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .authorize(self.client.get(&url))
            .query(query)
            .send()
            .await
            .map_err(|e| IngestError::EnrichmentUnavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("TMDB has nothing at {}", path);
            return Ok(None);
        }
        if !status.is_success() {
            error!("TMDB error for {}: HTTP {}", path, status);
            return Err(IngestError::EnrichmentUnavailable(format!(
                "TMDB returned HTTP {} for {}",
                status, path
            )));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| IngestError::EnrichmentUnavailable(e.to_string()))
    }

    async fn search(&self, media_type: &str, title: &str) -> Result<Option<i64>, IngestError> {
        debug!("Searching TMDB {} for: {}", media_type, title);

        let results: Option<SearchResponse> = self
            .get_json(
                &format!("/search/{}", media_type),
                &[("query", title), ("include_adult", "false")],
            )
            .await?;

        Ok(results.and_then(|r| r.results.first().map(|hit| hit.id)))
    }

    async fn details(&self, media_type: &str, id: &str) -> Result<Option<MediaDetail>, IngestError> {
        self.get_json(
            &format!("/{}/{}", media_type, id),
            &[("append_to_response", "credits")],
        )
        .await
    }
}

#[async_trait]
impl Enricher for TmdbClient {
    async fn lookup(&self, key: &LookupKey) -> Result<Option<EnrichmentData>, IngestError> {
        let media_type = if key.is_movie { "movie" } else { "tv" };

        let numeric_id = key
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()));

        let id = match numeric_id {
            Some(id) => id.to_string(),
            None => {
                let Some(title) = key.title.as_deref().filter(|t| !t.trim().is_empty()) else {
                    return Ok(None);
                };
                match self.search(media_type, title).await? {
                    Some(found) => found.to_string(),
                    None => {
                        debug!("No TMDB results for '{}'", title);
                        return Ok(None);
                    }
                }
            }
        };

        let detail = self.details(media_type, &id).await?;
        Ok(detail.map(|d| d.into_enrichment(key.is_movie)))
    }
}

fn image_url(size: &str, path: Option<&str>) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{}/{}{}", TMDB_IMAGE_BASE, size, p))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResult {
    id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaDetail {
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    credits: Option<Credits>,
    #[serde(default)]
    created_by: Vec<Creator>,
}

#[derive(Debug, Clone, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastMember>,
    #[serde(default)]
    crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, Deserialize)]
struct CastMember {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CrewMember {
    name: String,
    #[serde(default)]
    job: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Creator {
    name: String,
}

impl MediaDetail {
    fn into_enrichment(self, is_movie: bool) -> EnrichmentData {
        let date = if is_movie {
            self.release_date
        } else {
            self.first_air_date
        };
        let year = date
            .filter(|d| d.len() >= 4)
            .and_then(|d| d.get(..4).map(str::to_string));

        let credits = self.credits.unwrap_or_default();
        let director = if is_movie {
            credits
                .crew
                .iter()
                .find(|person| person.job == "Director")
                .map(|person| person.name.clone())
        } else {
            self.created_by.first().map(|creator| creator.name.clone())
        };

        EnrichmentData {
            year,
            genres: self
                .genres
                .into_iter()
                .map(|g| g.name)
                .filter(|name| !name.trim().is_empty())
                .collect(),
            rating: (self.vote_average != 0.0).then(|| decimal_text(self.vote_average)),
            overview: non_blank(self.overview),
            cast: credits
                .cast
                .into_iter()
                .take(TOP_CAST)
                .map(|member| member.name)
                .collect(),
            director,
            poster_url: image_url("w500", self.poster_path.as_deref()),
            backdrop_url: image_url("original", self.backdrop_path.as_deref()),
            runtime: if is_movie { self.runtime.filter(|r| *r > 0) } else { None },
        }
    }
}
