use serde::{Deserialize, Serialize};

use crate::media::{EpisodeSet, MediaIdentity, MediaType, Resolution};

/// Constraints a search applies to every candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterArgs {
    /// Accepted seasons; empty accepts any.
    #[serde(default)]
    pub seasons: EpisodeSet,
    /// Accepted episodes; empty accepts any.
    #[serde(default)]
    pub episodes: EpisodeSet,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    /// Site allow-list; `None` searches every site.
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    /// Reject zero-seeder hits on private sites.
    #[serde(default)]
    pub require_seeders: bool,
    #[serde(default)]
    pub rule_group: Option<String>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    /// Extra regex the title or description must match.
    #[serde(default)]
    pub include: Option<String>,
    /// Extra regex the title or description must not match.
    #[serde(default)]
    pub exclude: Option<String>,
    /// Only accept candidates strictly better than `best_rank`.
    #[serde(default)]
    pub quality_upgrade: bool,
    #[serde(default)]
    pub best_rank: Option<u32>,
}

impl FilterArgs {
    /// Overlay the caller's explicit filters on the derived ones.
    pub fn merge(mut self, overrides: &FilterArgs) -> Self {
        if !overrides.seasons.is_empty() {
            self.seasons = overrides.seasons.clone();
        }
        if !overrides.episodes.is_empty() {
            self.episodes = overrides.episodes.clone();
        }
        if overrides.year.is_some() {
            self.year = overrides.year;
        }
        if overrides.media_type.is_some() {
            self.media_type = overrides.media_type;
        }
        if overrides.sites.is_some() {
            self.sites = overrides.sites.clone();
        }
        if overrides.rule_group.is_some() {
            self.rule_group = overrides.rule_group.clone();
        }
        if overrides.resolution.is_some() {
            self.resolution = overrides.resolution;
        }
        if overrides.include.is_some() {
            self.include = overrides.include.clone();
        }
        if overrides.exclude.is_some() {
            self.exclude = overrides.exclude.clone();
        }
        if overrides.quality_upgrade {
            self.quality_upgrade = true;
            self.best_rank = overrides.best_rank;
        }
        self.require_seeders = self.require_seeders || overrides.require_seeders;
        self
    }
}

/// A classified, ranked release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelease {
    pub raw_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parsed title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default)]
    pub seasons: EpisodeSet,
    #[serde(default)]
    pub episodes: EpisodeSet,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Canonical identity, when a target was being matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<MediaIdentity>,
    pub size_bytes: u64,
    pub seeders: u32,
    pub peers: u32,
    pub site: String,
    pub site_rank: u32,
    /// Quality rank from the rule group, lower is better.
    pub quality_rank: u32,
    pub upload_factor: f64,
    pub download_factor: f64,
    /// `.torrent` URL or magnet URI.
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    /// Best rank recorded for the target when searching in upgrade mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_rank: Option<u32>,
}

impl CandidateRelease {
    /// Coverage key of the resolved identity.
    pub fn identity_key(&self) -> Option<String> {
        self.identity.as_ref().map(|i| i.key())
    }

    /// Title used for grouping: the canonical title when resolved.
    pub fn group_title(&self) -> String {
        self.identity
            .as_ref()
            .map(|i| i.title.as_str())
            .unwrap_or(&self.title)
            .to_lowercase()
    }

    /// Identity key used for deduplication.
    pub fn dedup_key(&self) -> String {
        match self.media_type {
            MediaType::Tv => format!(
                "{}|s{:?}|e{:?}",
                self.group_title(),
                self.seasons,
                self.episodes
            ),
            // A resolved movie is one item whatever year its name carries
            MediaType::Movie => match &self.identity {
                Some(identity) => identity.key(),
                None => format!(
                    "{}|{}",
                    self.group_title(),
                    self.year.map(|y| y.to_string()).unwrap_or_default()
                ),
            },
        }
    }

    /// The single season this release covers, if it covers exactly one.
    pub fn single_season(&self) -> Option<u32> {
        if self.seasons.len() == 1 {
            self.seasons.iter().next().copied()
        } else {
            None
        }
    }

    pub fn is_movie(&self) -> bool {
        self.media_type == MediaType::Movie
    }
}

/// Outcome of classifying one raw hit.
#[derive(Debug, Clone)]
pub enum Verdict {
    Accepted(Box<CandidateRelease>),
    /// Rejected by a rule, type conflict, upgrade check, or duplicate.
    RuleFail(String),
    /// Did not match the requested media.
    NoMatch(String),
    Error(String),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Accepted(_) => "accepted",
            Verdict::RuleFail(_) => "rule_fail",
            Verdict::NoMatch(_) => "no_match",
            Verdict::Error(_) => "error",
        }
    }
}
