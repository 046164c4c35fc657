//! Delimiter-packed subscription descriptions from older databases.
//!
//! Layout: `rss_sites#search_sites#upgrade#restype@pix@rule@team#total@current`,
//! sites separated by `|`. Every part is optional; trailing parts may be
//! missing entirely.

use crate::media::Resolution;

use super::SubscriptionFilters;

/// Decoded legacy description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyDescription {
    pub filters: SubscriptionFilters,
    pub quality_upgrade: bool,
    pub total_episodes: Option<u32>,
    pub current_episode: Option<u32>,
}

/// Parse a legacy description. Never fails; unknown parts are ignored.
pub fn parse_legacy_description(desc: &str) -> LegacyDescription {
    let mut parsed = LegacyDescription::default();
    let notes: Vec<&str> = desc.split('#').collect();

    if let Some(rss) = notes.first() {
        parsed.filters.rss_sites = split_sites(rss);
    }
    if let Some(search) = notes.get(1) {
        parsed.filters.search_sites = split_sites(search);
    }
    if let Some(flag) = notes.get(2) {
        parsed.quality_upgrade = flag.trim() == "Y";
    }
    if let Some(filters) = notes.get(3) {
        let parts: Vec<&str> = filters.split('@').collect();
        parsed.filters.source = parts.first().and_then(|s| non_empty(s));
        parsed.filters.resolution = parts
            .get(1)
            .and_then(|s| Resolution::parse(s.trim()));
        // "0" means no rule group in old rows
        parsed.filters.rule_group = parts
            .get(2)
            .and_then(|s| non_empty(s))
            .filter(|s| s != "0");
        parsed.filters.team = parts.get(3).and_then(|s| non_empty(s));
    }
    if let Some(episodes) = notes.get(4) {
        let mut parts = episodes.split('@');
        parsed.total_episodes = parts.next().and_then(parse_count);
        parsed.current_episode = parts.next().and_then(parse_count);
    }

    parsed
}

/// Encode filters back into the legacy layout.
pub fn format_legacy_description(desc: &LegacyDescription) -> String {
    let f = &desc.filters;
    let count = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
    format!(
        "{}#{}#{}#{}@{}@{}@{}#{}@{}",
        f.rss_sites.join("|"),
        f.search_sites.join("|"),
        if desc.quality_upgrade { "Y" } else { "N" },
        f.source.as_deref().unwrap_or(""),
        f.resolution.map(|r| r.as_str()).unwrap_or(""),
        f.rule_group.as_deref().unwrap_or(""),
        f.team.as_deref().unwrap_or(""),
        count(desc.total_episodes),
        count(desc.current_episode),
    )
}

fn split_sites(s: &str) -> Vec<String> {
    s.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn parse_count(s: &str) -> Option<u32> {
    s.trim().parse::<u32>().ok().filter(|n| *n > 0)
}
