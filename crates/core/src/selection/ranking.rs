//! Candidate ordering and deduplication.

use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;

use crate::classifier::CandidateRelease;

use super::DownloadOrder;

/// Sort best first: title, quality rank, then site rank and seeders in the
/// configured order, then broader coverage.
pub fn sort_candidates(candidates: &mut [CandidateRelease], order: DownloadOrder) {
    candidates.sort_by(|a, b| compare(a, b, order));
}

fn compare(a: &CandidateRelease, b: &CandidateRelease, order: DownloadOrder) -> Ordering {
    let site = |c: &CandidateRelease| c.site_rank;
    let seeders = |c: &CandidateRelease| Reverse(c.seeders);

    let tie_break = match order {
        DownloadOrder::Site => site(a)
            .cmp(&site(b))
            .then_with(|| seeders(a).cmp(&seeders(b))),
        DownloadOrder::Seeders => seeders(a)
            .cmp(&seeders(b))
            .then_with(|| site(a).cmp(&site(b))),
    };

    a.group_title()
        .cmp(&b.group_title())
        .then_with(|| a.quality_rank.cmp(&b.quality_rank))
        .then(tie_break)
        .then_with(|| b.seasons.len().cmp(&a.seasons.len()))
        .then_with(|| b.episodes.len().cmp(&a.episodes.len()))
}

/// Keep only the first occurrence per dedup key; input must already be sorted.
pub fn dedup_candidates(candidates: Vec<CandidateRelease>) -> Vec<CandidateRelease> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::EpisodeSet;
    use crate::testing::fixtures;

    #[test]
    fn test_sort_by_quality_then_site() {
        let mut a = fixtures::tv_candidate("Show", 1, &[1]);
        a.quality_rank = 20;
        a.site_rank = 1;
        let mut b = fixtures::tv_candidate("Show", 1, &[1]);
        b.quality_rank = 10;
        b.site_rank = 5;
        let mut c = fixtures::tv_candidate("Show", 1, &[1]);
        c.quality_rank = 10;
        c.site_rank = 2;

        let mut list = vec![a, b, c];
        sort_candidates(&mut list, DownloadOrder::Site);
        let ranks: Vec<_> = list.iter().map(|c| (c.quality_rank, c.site_rank)).collect();
        assert_eq!(ranks, vec![(10, 2), (10, 5), (20, 1)]);
    }

    #[test]
    fn test_seeders_order() {
        let mut a = fixtures::movie_candidate("Film", 2020);
        a.site_rank = 1;
        a.seeders = 5;
        let mut b = fixtures::movie_candidate("Film", 2020);
        b.site_rank = 2;
        b.seeders = 50;

        let mut list = vec![a.clone(), b.clone()];
        sort_candidates(&mut list, DownloadOrder::Seeders);
        assert_eq!(list[0].seeders, 50);

        let mut list = vec![b, a];
        sort_candidates(&mut list, DownloadOrder::Site);
        assert_eq!(list[0].seeders, 5);
    }

    #[test]
    fn test_broader_coverage_breaks_ties() {
        let narrow = fixtures::tv_candidate("Show", 1, &[1]);
        let wide = fixtures::tv_candidate("Show", 1, &[1, 2, 3]);
        let mut list = vec![narrow, wide];
        sort_candidates(&mut list, DownloadOrder::Site);
        assert_eq!(list[0].episodes, EpisodeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_dedup_keeps_highest_ranked() {
        let mut best = fixtures::tv_candidate("Show", 1, &[4]);
        best.quality_rank = 1;
        best.site = "best".to_string();
        let mut worse = fixtures::tv_candidate("Show", 1, &[4]);
        worse.quality_rank = 9;
        worse.site = "worse".to_string();
        let other = fixtures::tv_candidate("Show", 1, &[5]);

        let mut list = vec![worse, other, best];
        sort_candidates(&mut list, DownloadOrder::Site);
        let deduped = dedup_candidates(list);
        assert_eq!(deduped.len(), 2);
        assert!(deduped.iter().any(|c| c.site == "best"));
        assert!(!deduped.iter().any(|c| c.site == "worse"));
    }
}
