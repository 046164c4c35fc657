//! Subscription records and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classifier::FilterArgs;
use crate::media::{EpisodeSet, MediaType, Resolution};

/// Lifecycle of a subscription.
///
/// `New -> Searching -> (Retained | Finished)`; `Retained` subscriptions are
/// searched again on later cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    New,
    Searching,
    Retained,
    Finished,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::New => "new",
            SubscriptionState::Searching => "searching",
            SubscriptionState::Retained => "retained",
            SubscriptionState::Finished => "finished",
        }
    }

    /// Accepts both names and the single-letter legacy codes.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "new" | "D" => Some(SubscriptionState::New),
            "searching" | "S" => Some(SubscriptionState::Searching),
            "retained" | "R" => Some(SubscriptionState::Retained),
            "finished" | "F" => Some(SubscriptionState::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-subscription search filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilters {
    /// Sites watched by the feed checker (kept for round-tripping only).
    #[serde(default)]
    pub rss_sites: Vec<String>,
    /// Sites to search; empty searches every site.
    #[serde(default)]
    pub search_sites: Vec<String>,
    #[serde(default)]
    pub rule_group: Option<String>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    /// Source keyword such as "BluRay" or "WEB-DL".
    #[serde(default)]
    pub source: Option<String>,
    /// Release group / subtitle team the title must mention.
    #[serde(default)]
    pub team: Option<String>,
}

impl SubscriptionFilters {
    /// Filter arguments for one search of this subscription.
    pub fn to_filter_args(&self, quality_upgrade: bool, best_rank: Option<u32>) -> FilterArgs {
        FilterArgs {
            rule_group: self.rule_group.clone(),
            resolution: self.resolution,
            include: match (&self.source, &self.team) {
                (Some(source), Some(team)) => Some(format!(
                    "(?:{}).*(?:{})|(?:{}).*(?:{})",
                    source, team, team, source
                )),
                (Some(p), None) | (None, Some(p)) => Some(p.clone()),
                (None, None) => None,
            },
            quality_upgrade,
            best_rank: if quality_upgrade { best_rank } else { None },
            ..Default::default()
        }
    }

    pub fn sites(&self) -> Option<Vec<String>> {
        if self.search_sites.is_empty() {
            None
        } else {
            Some(self.search_sites.clone())
        }
    }
}

/// A persistent "keep trying until satisfied" request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub name: String,
    pub year: Option<u32>,
    pub media_type: MediaType,
    /// Catalog id (TMDB) when known.
    pub external_id: Option<String>,
    /// TV season; `None` for movies.
    pub season: Option<u32>,
    pub filters: SubscriptionFilters,
    /// Re-acquire until the best rule of the group is reached.
    pub quality_upgrade: bool,
    /// Best quality rank downloaded so far (upgrade mode).
    pub best_rank: Option<u32>,
    /// Residual missing episodes; `None` when never computed.
    pub missing_episodes: Option<EpisodeSet>,
    pub total_episodes: Option<u32>,
    /// First wanted episode; earlier ones are ignored.
    pub start_episode: Option<u32>,
    pub state: SubscriptionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub name: String,
    pub year: Option<u32>,
    pub media_type: MediaType,
    pub external_id: Option<String>,
    pub season: Option<u32>,
    pub filters: SubscriptionFilters,
    pub quality_upgrade: bool,
    pub total_episodes: Option<u32>,
    pub start_episode: Option<u32>,
}

impl NewSubscription {
    pub fn movie(name: impl Into<String>, year: Option<u32>) -> Self {
        Self {
            name: name.into(),
            year,
            media_type: MediaType::Movie,
            external_id: None,
            season: None,
            filters: SubscriptionFilters::default(),
            quality_upgrade: false,
            total_episodes: None,
            start_episode: None,
        }
    }

    pub fn tv(name: impl Into<String>, year: Option<u32>, season: u32) -> Self {
        Self {
            media_type: MediaType::Tv,
            season: Some(season),
            ..Self::movie(name, year)
        }
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_filters(mut self, filters: SubscriptionFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_quality_upgrade(mut self, upgrade: bool) -> Self {
        self.quality_upgrade = upgrade;
        self
    }

    pub fn with_episodes(mut self, total: Option<u32>, start: Option<u32>) -> Self {
        self.total_episodes = total;
        self.start_episode = start;
        self
    }
}

/// Archived, fully satisfied subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub subscription_id: i64,
    pub name: String,
    pub year: Option<u32>,
    pub media_type: MediaType,
    pub season: Option<u32>,
    /// Coverage that was still missing when the subscription last searched.
    pub satisfied_episodes: Option<EpisodeSet>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        assert_eq!(SubscriptionState::parse("D"), Some(SubscriptionState::New));
        assert_eq!(
            SubscriptionState::parse("retained"),
            Some(SubscriptionState::Retained)
        );
        assert_eq!(SubscriptionState::parse("x"), None);
        assert_eq!(SubscriptionState::Searching.to_string(), "searching");
    }

    #[test]
    fn test_filters_to_args() {
        let filters = SubscriptionFilters {
            search_sites: vec!["alpha".to_string()],
            rule_group: Some("hd".to_string()),
            team: Some("GRP".to_string()),
            ..Default::default()
        };
        let args = filters.to_filter_args(false, Some(40));
        assert_eq!(args.rule_group.as_deref(), Some("hd"));
        assert_eq!(args.include.as_deref(), Some("GRP"));
        assert!(args.best_rank.is_none());
        assert_eq!(filters.sites(), Some(vec!["alpha".to_string()]));

        let args = filters.to_filter_args(true, Some(40));
        assert!(args.quality_upgrade);
        assert_eq!(args.best_rank, Some(40));
    }

    #[test]
    fn test_new_subscription_builders() {
        let sub = NewSubscription::tv("Show", Some(2020), 2)
            .with_external_id("100")
            .with_episodes(Some(8), Some(3));
        assert_eq!(sub.media_type, MediaType::Tv);
        assert_eq!(sub.season, Some(2));
        assert_eq!(sub.external_id.as_deref(), Some("100"));
        assert_eq!(sub.start_episode, Some(3));
    }
}
