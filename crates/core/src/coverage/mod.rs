//! Per-identity ledger of what is still missing.
//!
//! A `CoverageRequest` maps each wanted show to the seasons that still need
//! content. Entries only ever shrink: a season disappears once nothing is
//! missing from it, and an identity disappears once it has no seasons left.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::media::{EpisodeSet, MediaIdentity};

/// What is missing from one season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "episodes", rename_all = "snake_case")]
pub enum Missing {
    /// Nothing of the season is present.
    WholeSeason,
    /// Only these episode numbers are missing. Never empty.
    Episodes(EpisodeSet),
}

/// Need for a single season of a show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonNeed {
    pub season: u32,
    pub missing: Missing,
    /// Total episodes in the season, 0 when unknown.
    pub total_episodes: u32,
}

impl SeasonNeed {
    /// Build a need from a missing list; an empty list means the whole season.
    ///
    /// Episodes outside `1..=total_episodes` are dropped when the total is known.
    /// A list left empty by that filter also becomes a whole-season need:
    /// coverage that cannot be trusted is treated as fully missing.
    pub fn new(season: u32, missing: impl IntoIterator<Item = u32>, total_episodes: u32) -> Self {
        let episodes: EpisodeSet = missing
            .into_iter()
            .filter(|e| total_episodes == 0 || (1..=total_episodes).contains(e))
            .collect();
        let missing = if episodes.is_empty() {
            Missing::WholeSeason
        } else {
            Missing::Episodes(episodes)
        };
        Self {
            season,
            missing,
            total_episodes,
        }
    }

    pub fn whole(season: u32, total_episodes: u32) -> Self {
        Self {
            season,
            missing: Missing::WholeSeason,
            total_episodes,
        }
    }

    pub fn is_whole_season(&self) -> bool {
        matches!(self.missing, Missing::WholeSeason)
    }

    /// Missing episodes, expanding a whole-season need to `1..=total`.
    pub fn needed_episodes(&self) -> EpisodeSet {
        match &self.missing {
            Missing::WholeSeason => (1..=self.total_episodes).collect(),
            Missing::Episodes(eps) => eps.clone(),
        }
    }

    /// Explicit missing list; empty for a whole-season need.
    pub fn missing_list(&self) -> Vec<u32> {
        match &self.missing {
            Missing::WholeSeason => Vec::new(),
            Missing::Episodes(eps) => eps.iter().copied().collect(),
        }
    }
}

/// Seasons still needed for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaNeed {
    pub identity: MediaIdentity,
    pub seasons: BTreeMap<u32, SeasonNeed>,
}

/// The "still missing" ledger, keyed by `MediaIdentity::key()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRequest {
    needs: BTreeMap<String, MediaNeed>,
}

impl CoverageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coverage for a single season of one identity.
    pub fn for_season(identity: &MediaIdentity, need: SeasonNeed) -> Self {
        let mut coverage = Self::new();
        coverage.insert(identity, need);
        coverage
    }

    /// Add or replace the need for one season.
    pub fn insert(&mut self, identity: &MediaIdentity, need: SeasonNeed) {
        self.needs
            .entry(identity.key())
            .or_insert_with(|| MediaNeed {
                identity: identity.clone(),
                seasons: BTreeMap::new(),
            })
            .seasons
            .insert(need.season, need);
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.needs.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&MediaNeed> {
        self.needs.get(key)
    }

    pub fn season(&self, key: &str, season: u32) -> Option<&SeasonNeed> {
        self.needs.get(key).and_then(|n| n.seasons.get(&season))
    }

    pub fn keys(&self) -> Vec<String> {
        self.needs.keys().cloned().collect()
    }

    pub fn needs(&self) -> impl Iterator<Item = &MediaNeed> {
        self.needs.values()
    }

    /// Seasons of `key` that are missing in full.
    pub fn whole_seasons(&self, key: &str) -> EpisodeSet {
        self.needs
            .get(key)
            .map(|n| {
                n.seasons
                    .values()
                    .filter(|s| s.is_whole_season())
                    .map(|s| s.season)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop the given seasons entirely (they were satisfied as a whole).
    pub fn remove_seasons(&mut self, key: &str, seasons: &EpisodeSet) {
        if let Some(need) = self.needs.get_mut(key) {
            for season in seasons {
                need.seasons.remove(season);
            }
            if need.seasons.is_empty() {
                self.needs.remove(key);
            }
        }
    }

    /// Remove satisfied episodes from a season, expanding whole-season needs first.
    ///
    /// Returns the episodes still needed for that season afterwards.
    pub fn remove_episodes(&mut self, key: &str, season: u32, done: &EpisodeSet) -> EpisodeSet {
        let Some(need) = self.needs.get_mut(key) else {
            return EpisodeSet::new();
        };
        let Some(season_need) = need.seasons.get_mut(&season) else {
            return EpisodeSet::new();
        };

        let remaining: EpisodeSet = season_need
            .needed_episodes()
            .difference(done)
            .copied()
            .collect();

        if remaining.is_empty() {
            need.seasons.remove(&season);
            if need.seasons.is_empty() {
                self.needs.remove(key);
            }
        } else {
            season_need.missing = Missing::Episodes(remaining.clone());
        }
        remaining
    }

    /// Keep only the episodes the library also reports as missing.
    ///
    /// An empty `library_missing` means the library holds the whole season.
    pub fn intersect_season(&mut self, key: &str, season: u32, library_missing: &EpisodeSet) {
        let present: EpisodeSet = match self.season(key, season) {
            Some(need) => need
                .needed_episodes()
                .difference(library_missing)
                .copied()
                .collect(),
            None => return,
        };
        if library_missing.is_empty() {
            if let Some(need) = self.needs.get_mut(key) {
                need.seasons.remove(&season);
                if need.seasons.is_empty() {
                    self.needs.remove(key);
                }
            }
            return;
        }
        if !present.is_empty() {
            self.remove_episodes(key, season, &present);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show() -> MediaIdentity {
        MediaIdentity::tv("100", "Show", Some(2020)).with_season(1, 10)
    }

    fn set(items: &[u32]) -> EpisodeSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_empty_list_means_whole_season() {
        let need = SeasonNeed::new(1, Vec::<u32>::new(), 10);
        assert!(need.is_whole_season());
        assert_eq!(need.needed_episodes().len(), 10);
        assert!(need.missing_list().is_empty());
    }

    #[test]
    fn test_out_of_range_episodes_dropped() {
        let need = SeasonNeed::new(1, vec![3, 11, 0], 10);
        assert_eq!(need.needed_episodes(), set(&[3]));
    }

    #[test]
    fn test_all_out_of_range_falls_back_to_whole_season() {
        let need = SeasonNeed::new(1, vec![11, 12], 10);
        assert!(need.is_whole_season());
        assert_eq!(need.needed_episodes().len(), 10);
    }

    #[test]
    fn test_remove_episodes_shrinks_then_drops() {
        let identity = show();
        let key = identity.key();
        let mut coverage = CoverageRequest::for_season(&identity, SeasonNeed::new(1, vec![1, 2, 3], 10));

        let remaining = coverage.remove_episodes(&key, 1, &set(&[1, 2]));
        assert_eq!(remaining, set(&[3]));
        assert_eq!(coverage.season(&key, 1).unwrap().needed_episodes(), set(&[3]));

        let remaining = coverage.remove_episodes(&key, 1, &set(&[3]));
        assert!(remaining.is_empty());
        assert!(coverage.is_empty());
    }

    #[test]
    fn test_remove_episodes_expands_whole_season() {
        let identity = show();
        let key = identity.key();
        let mut coverage = CoverageRequest::for_season(&identity, SeasonNeed::whole(1, 4));

        let remaining = coverage.remove_episodes(&key, 1, &set(&[2]));
        assert_eq!(remaining, set(&[1, 3, 4]));
        assert!(!coverage.season(&key, 1).unwrap().is_whole_season());
    }

    #[test]
    fn test_remove_seasons_drops_identity() {
        let identity = show();
        let key = identity.key();
        let mut coverage = CoverageRequest::new();
        coverage.insert(&identity, SeasonNeed::whole(1, 10));
        coverage.insert(&identity, SeasonNeed::whole(2, 8));
        assert_eq!(coverage.whole_seasons(&key), set(&[1, 2]));

        coverage.remove_seasons(&key, &set(&[1]));
        assert!(coverage.contains(&key));
        coverage.remove_seasons(&key, &set(&[2]));
        assert!(!coverage.contains(&key));
    }

    #[test]
    fn test_intersect_with_library() {
        let identity = show();
        let key = identity.key();
        let mut coverage = CoverageRequest::for_season(&identity, SeasonNeed::new(1, vec![1, 2, 3, 4], 10));

        coverage.intersect_season(&key, 1, &set(&[2, 4, 9]));
        assert_eq!(coverage.season(&key, 1).unwrap().needed_episodes(), set(&[2, 4]));

        coverage.intersect_season(&key, 1, &EpisodeSet::new());
        assert!(coverage.is_empty());
    }
}
