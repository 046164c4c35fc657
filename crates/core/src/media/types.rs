//! Media identity types shared by every stage of the acquisition flow.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Order-independent set of episode (or season) numbers.
pub type EpisodeSet = BTreeSet<u32>;

/// Kind of media a release or subscription refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "mov" => Some(MediaType::Movie),
            "tv" | "show" | "series" => Some(MediaType::Tv),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identity of a movie or show, as returned by the identity resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIdentity {
    /// Canonical catalog id (TMDB id).
    pub id: String,
    pub media_type: MediaType,
    /// Localized title.
    pub title: String,
    /// Title in the original language, if different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    /// Total episode count per season number (TV only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub season_episodes: BTreeMap<u32, u32>,
}

impl MediaIdentity {
    pub fn movie(id: impl Into<String>, title: impl Into<String>, year: Option<u32>) -> Self {
        Self {
            id: id.into(),
            media_type: MediaType::Movie,
            title: title.into(),
            original_title: None,
            year,
            imdb_id: None,
            season_episodes: BTreeMap::new(),
        }
    }

    pub fn tv(id: impl Into<String>, title: impl Into<String>, year: Option<u32>) -> Self {
        Self {
            media_type: MediaType::Tv,
            ..Self::movie(id, title, year)
        }
    }

    pub fn with_season(mut self, season: u32, total_episodes: u32) -> Self {
        self.season_episodes.insert(season, total_episodes);
        self
    }

    /// Key used for coverage bookkeeping; unique across media types.
    pub fn key(&self) -> String {
        format!("{}:{}", self.media_type.as_str(), self.id)
    }

    pub fn total_episodes(&self, season: u32) -> Option<u32> {
        self.season_episodes.get(&season).copied()
    }
}

/// Where a search request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrigin {
    /// Standing subscription cycle.
    Subscription,
    /// Operator triggered from a web surface.
    Web,
    /// Chat bot command; results are kept as the "last search" snapshot.
    Chat,
}

impl SearchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOrigin::Subscription => "subscription",
            SearchOrigin::Web => "web",
            SearchOrigin::Chat => "chat",
        }
    }

    /// Interactive origins keep a snapshot and honor the auto-download switch.
    pub fn is_interactive(&self) -> bool {
        match self {
            SearchOrigin::Chat => true,
            SearchOrigin::Subscription | SearchOrigin::Web => false,
        }
    }
}
