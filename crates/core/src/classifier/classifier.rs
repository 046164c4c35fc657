//! Candidate filter and classifier.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex_lite::Regex;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::events::ClassifyTally;
use crate::identity::{MediaResolver, ResolveQuery};
use crate::media::{parse_release, EpisodeSet, MediaIdentity, MediaType};
use crate::metrics;
use crate::searcher::{IndexerSite, RawCandidate};

use super::{CandidateRelease, FilterArgs, RuleBook, RuleSubject, Verdict};

/// Turns raw indexer hits into ranked `CandidateRelease`s.
///
/// Identity lookups are cached by normalized title, year and type for the
/// lifetime of the classifier; both hits and misses are cached, errors are not.
pub struct CandidateClassifier {
    rules: Arc<RuleBook>,
    resolver: Arc<dyn MediaResolver>,
    cache: RwLock<HashMap<String, Option<MediaIdentity>>>,
}

/// Per-search patterns compiled from `FilterArgs`.
struct ArgPatterns {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl ArgPatterns {
    fn compile(args: &FilterArgs) -> Self {
        let compile = |p: &Option<String>| {
            p.as_ref()
                .filter(|p| !p.is_empty())
                .and_then(|p| Regex::new(&format!("(?i){}", p)).ok())
        };
        Self {
            include: compile(&args.include),
            exclude: compile(&args.exclude),
        }
    }
}

impl CandidateClassifier {
    pub fn new(rules: Arc<RuleBook>, resolver: Arc<dyn MediaResolver>) -> Self {
        Self {
            rules,
            resolver,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    /// Classify one indexer batch, dropping duplicates within it.
    pub async fn classify_batch(
        &self,
        raws: Vec<RawCandidate>,
        site: &IndexerSite,
        target: Option<&MediaIdentity>,
        args: &FilterArgs,
    ) -> (Vec<CandidateRelease>, ClassifyTally) {
        let patterns = ArgPatterns::compile(args);
        let mut accepted = Vec::new();
        let mut seen: HashSet<(String, u64)> = HashSet::new();
        let mut tally = ClassifyTally::default();

        for raw in &raws {
            let verdict = match self.classify_with(raw, site, target, args, &patterns).await {
                Verdict::Accepted(candidate) => {
                    if seen.insert((raw.title.to_lowercase(), raw.size_bytes)) {
                        Verdict::Accepted(candidate)
                    } else {
                        Verdict::RuleFail("duplicate in batch".to_string())
                    }
                }
                other => other,
            };

            metrics::CLASSIFICATION_RESULTS
                .with_label_values(&[verdict.label()])
                .inc();

            match verdict {
                Verdict::Accepted(candidate) => {
                    tally.accepted += 1;
                    accepted.push(*candidate);
                }
                Verdict::RuleFail(reason) => {
                    tally.rule_fail += 1;
                    trace!(title = %raw.title, reason = %reason, "Rule fail");
                }
                Verdict::NoMatch(reason) => {
                    tally.no_match += 1;
                    trace!(title = %raw.title, reason = %reason, "No match");
                }
                Verdict::Error(reason) => {
                    tally.error += 1;
                    debug!(title = %raw.title, reason = %reason, "Classification error");
                }
            }
        }

        (accepted, tally)
    }

    /// Classify a single raw hit.
    pub async fn classify(
        &self,
        raw: &RawCandidate,
        site: &IndexerSite,
        target: Option<&MediaIdentity>,
        args: &FilterArgs,
    ) -> Verdict {
        self.classify_with(raw, site, target, args, &ArgPatterns::compile(args))
            .await
    }

    async fn classify_with(
        &self,
        raw: &RawCandidate,
        site: &IndexerSite,
        target: Option<&MediaIdentity>,
        args: &FilterArgs,
        patterns: &ArgPatterns,
    ) -> Verdict {
        if raw.title.trim().is_empty() {
            return Verdict::Error("empty title".to_string());
        }

        if !site.public && args.require_seeders && raw.seeders == Some(0) {
            return Verdict::RuleFail("no seeders".to_string());
        }

        let meta = parse_release(&raw.title);
        if !meta.is_parsable() {
            return Verdict::NoMatch("unparsable title".to_string());
        }

        let parsed_type = meta.media_type();
        if parsed_type == MediaType::Tv && args.media_type == Some(MediaType::Movie) {
            return Verdict::RuleFail("tv release for movie request".to_string());
        }

        let text = match &raw.description {
            Some(d) => format!("{} {}", raw.title, d),
            None => raw.title.clone(),
        };

        if let Some(wanted) = args.resolution {
            if meta.resolution != Some(wanted) {
                return Verdict::RuleFail(format!("resolution is not {}", wanted.as_str()));
            }
        }
        if let Some(include) = &patterns.include {
            if !include.is_match(&text) {
                return Verdict::RuleFail("include pattern".to_string());
            }
        }
        if let Some(exclude) = &patterns.exclude {
            if exclude.is_match(&text) {
                return Verdict::RuleFail("exclude pattern".to_string());
            }
        }

        let episode_count = if !meta.episodes.is_empty() {
            Some(meta.episodes.len() as u32)
        } else {
            target.and_then(|t| {
                let total: u32 = meta
                    .seasons
                    .iter()
                    .filter_map(|s| t.total_episodes(*s))
                    .sum();
                (total > 0).then_some(total)
            })
        };
        let subject = RuleSubject {
            text: &text,
            size_bytes: raw.size_bytes,
            media_type: parsed_type,
            episode_count,
            upload_factor: raw.upload_factor,
            download_factor: raw.download_factor,
        };
        let Some(quality_rank) = self.rules.rank(args.rule_group.as_deref(), &subject) else {
            return Verdict::RuleFail("no quality rule matched".to_string());
        };

        let identity = match target {
            None => None,
            Some(target) => {
                let resolved = if raw.imdb_id.is_some() && raw.imdb_id == target.imdb_id {
                    Some(target.clone())
                } else {
                    let query = ResolveQuery::new(meta.title.clone())
                        .with_year(meta.year)
                        .with_type(args.media_type.unwrap_or(parsed_type));
                    match self.resolve_cached(&query).await {
                        Ok(found) => found,
                        Err(e) => return Verdict::Error(format!("identity resolution: {}", e)),
                    }
                };

                let Some(identity) = resolved else {
                    return Verdict::NoMatch("no canonical identity".to_string());
                };
                if identity.id != target.id {
                    return Verdict::NoMatch(format!(
                        "identity {} is not target {}",
                        identity.id, target.id
                    ));
                }
                if let Some(wanted) = args.media_type {
                    if identity.media_type != wanted {
                        return Verdict::RuleFail("media type conflict".to_string());
                    }
                }
                Some(identity)
            }
        };

        let media_type = identity
            .as_ref()
            .map(|i| i.media_type)
            .unwrap_or(parsed_type);
        let mut seasons = meta.seasons.clone();
        if media_type == MediaType::Tv && seasons.is_empty() {
            seasons.insert(1);
        }

        if args.quality_upgrade {
            if media_type == MediaType::Tv && !meta.episodes.is_empty() {
                return Verdict::RuleFail("upgrade needs a complete season".to_string());
            }
            if let Some(best) = args.best_rank {
                if quality_rank >= best {
                    return Verdict::RuleFail(format!(
                        "rank {} is not better than {}",
                        quality_rank, best
                    ));
                }
            }
        }

        if media_type == MediaType::Tv
            && !args.seasons.is_empty()
            && !seasons.is_subset(&args.seasons)
        {
            return Verdict::NoMatch("season filter".to_string());
        }
        if !args.episodes.is_empty() && !meta.episodes.is_subset(&args.episodes) {
            return Verdict::NoMatch("episode filter".to_string());
        }
        if let (Some(want), Some(got)) = (args.year, meta.year) {
            if want != got {
                return Verdict::NoMatch("year filter".to_string());
            }
        }

        Verdict::Accepted(Box::new(CandidateRelease {
            raw_title: raw.title.clone(),
            description: raw.description.clone(),
            title: meta.title,
            year: meta.year,
            seasons,
            episodes: meta.episodes,
            media_type,
            resolution: meta.resolution,
            identity,
            size_bytes: raw.size_bytes,
            seeders: raw.seeders.unwrap_or(0),
            peers: raw.peers,
            site: site.name.clone(),
            site_rank: site.rank,
            quality_rank,
            upload_factor: raw.upload_factor,
            download_factor: raw.download_factor,
            locator: raw.locator.clone(),
            page_url: raw.page_url.clone(),
            best_rank: args.best_rank,
        }))
    }

    async fn resolve_cached(
        &self,
        query: &ResolveQuery,
    ) -> Result<Option<MediaIdentity>, crate::identity::ResolveError> {
        let key = cache_key(query);
        if let Some(hit) = self.cache.read().await.get(&key) {
            return Ok(hit.clone());
        }

        let resolved = self.resolver.resolve(query).await?;
        self.cache.write().await.insert(key, resolved.clone());
        Ok(resolved)
    }
}

fn cache_key(query: &ResolveQuery) -> String {
    let title: String = query
        .title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect();
    format!(
        "{}|{}|{}",
        title,
        query.year.map(|y| y.to_string()).unwrap_or_default(),
        query.media_type.map(|t| t.as_str()).unwrap_or("")
    )
}

/// Seasons a target asks for, with episodes alone implying season 1.
pub fn requested_seasons(seasons: &EpisodeSet, episodes: &EpisodeSet) -> EpisodeSet {
    if seasons.is_empty() && !episodes.is_empty() {
        EpisodeSet::from([1])
    } else {
        seasons.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockResolver};

    fn site(public: bool) -> IndexerSite {
        IndexerSite {
            name: "site-a".to_string(),
            public,
            rank: 1,
        }
    }

    fn show() -> MediaIdentity {
        MediaIdentity::tv("100", "Show", Some(2020)).with_season(1, 10)
    }

    fn classifier(resolver: MockResolver) -> CandidateClassifier {
        CandidateClassifier::new(Arc::new(RuleBook::empty()), Arc::new(resolver))
    }

    fn tv_args() -> FilterArgs {
        FilterArgs {
            seasons: EpisodeSet::from([1]),
            media_type: Some(MediaType::Tv),
            require_seeders: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_accepts_matching_episode() {
        let resolver = MockResolver::new();
        resolver.add(show()).await;
        let classifier = classifier(resolver);

        let raw = fixtures::raw("Show.S01E03.1080p.WEB-DL", "site-a");
        let verdict = classifier
            .classify(&raw, &site(false), Some(&show()), &tv_args())
            .await;
        let Verdict::Accepted(candidate) = verdict else {
            panic!("expected acceptance, got {:?}", verdict);
        };
        assert_eq!(candidate.identity_key(), Some("tv:100".to_string()));
        assert_eq!(candidate.episodes, EpisodeSet::from([3]));
        assert_eq!(candidate.site_rank, 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_title_as_error() {
        let classifier = classifier(MockResolver::new());
        let raw = fixtures::raw("  ", "site-a");
        let verdict = classifier.classify(&raw, &site(false), None, &tv_args()).await;
        assert!(matches!(verdict, Verdict::Error(_)));
    }

    #[tokio::test]
    async fn test_zero_seeders_only_rejected_on_private_sites() {
        let classifier = classifier(MockResolver::new());
        let mut raw = fixtures::raw("Show.S01E03.1080p", "site-a");
        raw.seeders = Some(0);

        let verdict = classifier.classify(&raw, &site(false), None, &tv_args()).await;
        assert!(matches!(verdict, Verdict::RuleFail(_)));

        let verdict = classifier.classify(&raw, &site(true), None, &tv_args()).await;
        assert!(matches!(verdict, Verdict::Accepted(_)));
    }

    #[tokio::test]
    async fn test_tv_release_rejected_for_movie_request() {
        let classifier = classifier(MockResolver::new());
        let raw = fixtures::raw("Show.S01E03.1080p", "site-a");
        let args = FilterArgs {
            media_type: Some(MediaType::Movie),
            ..Default::default()
        };
        let verdict = classifier.classify(&raw, &site(false), None, &args).await;
        assert!(matches!(verdict, Verdict::RuleFail(_)));
    }

    #[tokio::test]
    async fn test_unresolved_identity_is_no_match() {
        let classifier = classifier(MockResolver::new());
        let raw = fixtures::raw("Other.Show.S01E03.1080p", "site-a");
        let verdict = classifier
            .classify(&raw, &site(false), Some(&show()), &tv_args())
            .await;
        assert!(matches!(verdict, Verdict::NoMatch(_)));
    }

    #[tokio::test]
    async fn test_resolver_error_is_error() {
        let resolver = MockResolver::new();
        resolver.set_fail(true).await;
        let classifier = classifier(resolver);
        let raw = fixtures::raw("Show.S01E03.1080p", "site-a");
        let verdict = classifier
            .classify(&raw, &site(false), Some(&show()), &tv_args())
            .await;
        assert!(matches!(verdict, Verdict::Error(_)));
    }

    #[tokio::test]
    async fn test_imdb_fast_path_skips_resolver() {
        let resolver = MockResolver::new();
        resolver.set_fail(true).await;
        let classifier = classifier(resolver);

        let mut target = MediaIdentity::movie("7", "Film", Some(2019));
        target.imdb_id = Some("tt0000007".to_string());
        let mut raw = fixtures::raw("Film.2019.1080p.BluRay", "site-a");
        raw.imdb_id = Some("tt0000007".to_string());

        let args = FilterArgs {
            media_type: Some(MediaType::Movie),
            year: Some(2019),
            ..Default::default()
        };
        let verdict = classifier.classify(&raw, &site(false), Some(&target), &args).await;
        assert!(matches!(verdict, Verdict::Accepted(_)));
    }

    #[tokio::test]
    async fn test_resolution_is_cached() {
        let resolver = Arc::new(MockResolver::new());
        resolver.add(show()).await;
        let classifier =
            CandidateClassifier::new(Arc::new(RuleBook::empty()), resolver.clone());

        for title in ["Show.S01E01.720p", "Show.S01E02.720p"] {
            let raw = fixtures::raw(title, "site-a");
            classifier
                .classify(&raw, &site(false), Some(&show()), &tv_args())
                .await;
        }
        assert_eq!(resolver.resolve_calls().await, 1);
    }

    #[tokio::test]
    async fn test_identity_mismatch() {
        let resolver = MockResolver::new();
        resolver.add(MediaIdentity::tv("999", "Show", Some(2020))).await;
        let classifier = classifier(resolver);
        let raw = fixtures::raw("Show.S01E03.1080p", "site-a");
        let verdict = classifier
            .classify(&raw, &site(false), Some(&show()), &tv_args())
            .await;
        assert!(matches!(verdict, Verdict::NoMatch(_)));
    }

    #[tokio::test]
    async fn test_season_filter() {
        let resolver = MockResolver::new();
        resolver.add(show()).await;
        let classifier = classifier(resolver);
        let raw = fixtures::raw("Show.S02E03.1080p", "site-a");
        let verdict = classifier
            .classify(&raw, &site(false), Some(&show()), &tv_args())
            .await;
        assert!(matches!(verdict, Verdict::NoMatch(_)));
    }

    #[tokio::test]
    async fn test_upgrade_rejects_episode_packs_and_worse_ranks() {
        let resolver = MockResolver::new();
        resolver.add(show()).await;
        let classifier = classifier(resolver);
        let mut args = tv_args();
        args.quality_upgrade = true;
        args.best_rank = Some(0);

        let raw = fixtures::raw("Show.S01E03.1080p", "site-a");
        let verdict = classifier.classify(&raw, &site(false), Some(&show()), &args).await;
        assert!(matches!(verdict, Verdict::RuleFail(_)));

        let raw = fixtures::raw("Show.S01.1080p", "site-a");
        let verdict = classifier.classify(&raw, &site(false), Some(&show()), &args).await;
        assert!(matches!(verdict, Verdict::RuleFail(_)));
    }

    #[tokio::test]
    async fn test_batch_dedup_and_tally() {
        let resolver = MockResolver::new();
        resolver.add(show()).await;
        let classifier = classifier(resolver);

        let raws = vec![
            fixtures::raw("Show.S01E01.1080p", "site-a"),
            fixtures::raw("Show.S01E01.1080p", "site-a"),
            fixtures::raw("Show.S02E01.1080p", "site-a"),
            fixtures::raw("", "site-a"),
        ];
        let (accepted, tally) = classifier
            .classify_batch(raws, &site(false), Some(&show()), &tv_args())
            .await;
        assert_eq!(accepted.len(), 1);
        assert_eq!(tally.accepted, 1);
        assert_eq!(tally.rule_fail, 1);
        assert_eq!(tally.no_match, 1);
        assert_eq!(tally.error, 1);
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn test_requested_seasons() {
        assert_eq!(
            requested_seasons(&EpisodeSet::new(), &EpisodeSet::from([3])),
            EpisodeSet::from([1])
        );
        assert_eq!(
            requested_seasons(&EpisodeSet::from([2]), &EpisodeSet::new()),
            EpisodeSet::from([2])
        );
    }
}
