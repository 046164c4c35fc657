//! TMDB (The Movie Database) identity resolver.
//!
//! TMDB requires an API key for access.
//! Rate limits are generous (around 40 requests per second).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::TmdbConfig;
use crate::media::{MediaIdentity, MediaType};

use super::{MediaResolver, ResolveError, ResolveQuery};

/// TMDB-backed resolver.
pub struct TmdbResolver {
    client: Client,
    base_url: String,
    api_key: String,
    language: Option<String>,
}

impl TmdbResolver {
    pub fn new(config: TmdbConfig) -> Result<Self, ResolveError> {
        if config.api_key.is_empty() {
            return Err(ResolveError::NotConfigured(
                "TMDB API key is required".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let base_url = config
            .base_url
            .unwrap_or_else(|| "https://api.themoviedb.org/3".to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            language: config.language,
        })
    }

    /// GET a TMDB endpoint; `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, ResolveError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params);
        if let Some(language) = &self.language {
            request = request.query(&[("language", language.as_str())]);
        }

        let response = request.send().await?;

        let status = response.status();
        if status == 404 {
            return Ok(None);
        }
        if status == 401 {
            return Err(ResolveError::NotConfigured(
                "Invalid TMDB API key".to_string(),
            ));
        }
        if status == 429 {
            return Err(ResolveError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolveError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| ResolveError::ParseError(format!("{}: {}", path, e)))
    }

    async fn search_movies(&self, query: &ResolveQuery) -> Result<Vec<TmdbMovieResult>, ResolveError> {
        debug!(query = %query.title, year = ?query.year, "TMDB movie search");
        let mut params = vec![("query", query.title.clone())];
        if let Some(year) = query.year {
            params.push(("year", year.to_string()));
        }
        let response: Option<TmdbSearchResponse<TmdbMovieResult>> =
            self.get_json("/search/movie", &params).await?;
        Ok(response.map(|r| r.results).unwrap_or_default())
    }

    async fn search_tv(&self, query: &ResolveQuery) -> Result<Vec<TmdbTvResult>, ResolveError> {
        debug!(query = %query.title, year = ?query.year, "TMDB TV search");
        let mut params = vec![("query", query.title.clone())];
        if let Some(year) = query.year {
            params.push(("first_air_date_year", year.to_string()));
        }
        let response: Option<TmdbSearchResponse<TmdbTvResult>> =
            self.get_json("/search/tv", &params).await?;
        Ok(response.map(|r| r.results).unwrap_or_default())
    }

    async fn movie_details(&self, id: u32) -> Result<Option<MediaIdentity>, ResolveError> {
        let details: Option<TmdbMovieDetails> =
            self.get_json(&format!("/movie/{}", id), &[]).await?;
        Ok(details.map(Into::into))
    }

    async fn tv_details(&self, id: u32) -> Result<Option<MediaIdentity>, ResolveError> {
        let details: Option<TmdbTvDetails> = self.get_json(&format!("/tv/{}", id), &[]).await?;
        Ok(details.map(Into::into))
    }

    async fn resolve_movie(&self, query: &ResolveQuery) -> Result<Option<MediaIdentity>, ResolveError> {
        let results = self.search_movies(query).await?;
        let picked = pick(
            results.iter().map(|r| {
                (
                    r.id,
                    r.title.as_str(),
                    r.original_title.as_deref(),
                    year_of(r.release_date.as_deref()),
                )
            }),
            query,
        );
        match picked {
            Some(id) => self.movie_details(id).await,
            None => Ok(None),
        }
    }

    async fn resolve_tv(&self, query: &ResolveQuery) -> Result<Option<MediaIdentity>, ResolveError> {
        let results = self.search_tv(query).await?;
        let picked = pick(
            results.iter().map(|r| {
                (
                    r.id,
                    r.name.as_str(),
                    r.original_name.as_deref(),
                    year_of(r.first_air_date.as_deref()),
                )
            }),
            query,
        );
        match picked {
            Some(id) => self.tv_details(id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MediaResolver for TmdbResolver {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn resolve(&self, query: &ResolveQuery) -> Result<Option<MediaIdentity>, ResolveError> {
        match query.media_type {
            Some(MediaType::Movie) => self.resolve_movie(query).await,
            Some(MediaType::Tv) => self.resolve_tv(query).await,
            None => match self.resolve_movie(query).await? {
                Some(identity) => Ok(Some(identity)),
                None => self.resolve_tv(query).await,
            },
        }
    }

    async fn lookup(
        &self,
        external_id: &str,
        media_type: MediaType,
    ) -> Result<Option<MediaIdentity>, ResolveError> {
        if external_id.starts_with("tt") {
            let found: Option<TmdbFindResponse> = self
                .get_json(
                    &format!("/find/{}", external_id),
                    &[("external_source", "imdb_id".to_string())],
                )
                .await?;
            let Some(found) = found else {
                return Ok(None);
            };
            return match media_type {
                MediaType::Movie => match found.movie_results.first() {
                    Some(m) => self.movie_details(m.id).await,
                    None => Ok(None),
                },
                MediaType::Tv => match found.tv_results.first() {
                    Some(t) => self.tv_details(t.id).await,
                    None => Ok(None),
                },
            };
        }

        let id: u32 = external_id
            .parse()
            .map_err(|_| ResolveError::ParseError(format!("not a TMDB id: {}", external_id)))?;
        match media_type {
            MediaType::Movie => self.movie_details(id).await,
            MediaType::Tv => self.tv_details(id).await,
        }
    }
}

/// Choose a search hit: exact title (and year) first, then year, then the top hit.
fn pick<'a>(
    hits: impl Iterator<Item = (u32, &'a str, Option<&'a str>, Option<u32>)>,
    query: &ResolveQuery,
) -> Option<u32> {
    let wanted = normalize_title(&query.title);
    let hits: Vec<_> = hits.collect();

    let title_matches = |title: &str, original: Option<&str>| {
        normalize_title(title) == wanted
            || original.map(|o| normalize_title(o) == wanted).unwrap_or(false)
    };
    let year_matches = |year: Option<u32>| match (query.year, year) {
        (Some(want), Some(got)) => want == got,
        (Some(_), None) => false,
        (None, _) => true,
    };

    if let Some(hit) = hits
        .iter()
        .find(|(_, t, o, y)| title_matches(t, *o) && year_matches(*y))
    {
        return Some(hit.0);
    }
    if query.strict {
        return None;
    }
    hits.iter()
        .find(|(_, _, _, y)| query.year.is_some() && year_matches(*y))
        .or_else(|| hits.first())
        .map(|hit| hit.0)
}

/// Lowercase alphanumerics only, so punctuation and spacing don't matter.
pub(crate) fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn year_of(date: Option<&str>) -> Option<u32> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

// ============================================================================
// TMDB API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbFindResponse {
    #[serde(default)]
    movie_results: Vec<TmdbMovieResult>,
    #[serde(default)]
    tv_results: Vec<TmdbTvResult>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieResult {
    id: u32,
    #[serde(default)]
    title: String,
    original_title: Option<String>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieDetails {
    id: u32,
    title: String,
    original_title: Option<String>,
    release_date: Option<String>,
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvResult {
    id: u32,
    #[serde(default)]
    name: String,
    original_name: Option<String>,
    first_air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvDetails {
    id: u32,
    name: String,
    original_name: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    seasons: Vec<TmdbSeasonResult>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonResult {
    season_number: u32,
    episode_count: Option<u32>,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<TmdbMovieDetails> for MediaIdentity {
    fn from(d: TmdbMovieDetails) -> Self {
        let mut identity = MediaIdentity::movie(d.id.to_string(), d.title.clone(), year_of(d.release_date.as_deref()));
        identity.original_title = d.original_title.filter(|o| *o != d.title);
        identity.imdb_id = d.imdb_id.filter(|i| !i.is_empty());
        identity
    }
}

impl From<TmdbTvDetails> for MediaIdentity {
    fn from(d: TmdbTvDetails) -> Self {
        let mut identity = MediaIdentity::tv(d.id.to_string(), d.name.clone(), year_of(d.first_air_date.as_deref()));
        identity.original_title = d.original_name.filter(|o| *o != d.name);
        // Season 0 holds specials.
        identity.season_episodes = d
            .seasons
            .into_iter()
            .filter(|s| s.season_number > 0)
            .map(|s| (s.season_number, s.episode_count.unwrap_or(0)))
            .collect::<BTreeMap<_, _>>();
        identity
    }
}
