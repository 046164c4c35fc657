//! Mock indexer for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::classifier::FilterArgs;
use crate::searcher::{Indexer, IndexerError, IndexerSite, RawCandidate};

/// A recorded site query for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub site: String,
    pub keyword: String,
}

/// Mock implementation of the Indexer trait.
///
/// Results are configured per `(site, keyword)`; unknown pairs return no hits.
///
/// ```rust,ignore
/// let indexer = MockIndexer::new(&["alpha", "beta"]);
/// indexer.add_results("alpha", "Show", vec![fixtures::raw("Show.S01E01", "alpha")]).await;
/// indexer.fail_site("beta").await;
/// ```
#[derive(Debug)]
pub struct MockIndexer {
    sites: Vec<IndexerSite>,
    results: Arc<RwLock<HashMap<(String, String), Vec<RawCandidate>>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    queries: Arc<RwLock<Vec<RecordedQuery>>>,
}

impl MockIndexer {
    /// Private sites ranked in the given order.
    pub fn new(sites: &[&str]) -> Self {
        Self {
            sites: sites
                .iter()
                .enumerate()
                .map(|(i, name)| IndexerSite {
                    name: name.to_string(),
                    public: false,
                    rank: i as u32 + 1,
                })
                .collect(),
            results: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn add_results(&self, site: &str, keyword: &str, raws: Vec<RawCandidate>) {
        self.results
            .write()
            .await
            .entry((site.to_string(), keyword.to_lowercase()))
            .or_default()
            .extend(raws);
    }

    /// Make every query to `site` fail.
    pub async fn fail_site(&self, site: &str) {
        self.failing.write().await.insert(site.to_string());
    }

    pub async fn searches(&self) -> Vec<RecordedQuery> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl Indexer for MockIndexer {
    fn name(&self) -> &str {
        "mock"
    }

    fn sites(&self) -> Vec<IndexerSite> {
        self.sites.clone()
    }

    async fn search(
        &self,
        site: &IndexerSite,
        keyword: &str,
        _args: &FilterArgs,
    ) -> Result<Vec<RawCandidate>, IndexerError> {
        self.queries.write().await.push(RecordedQuery {
            site: site.name.clone(),
            keyword: keyword.to_string(),
        });

        if self.failing.read().await.contains(&site.name) {
            return Err(IndexerError::ConnectionFailed(format!(
                "{} unreachable",
                site.name
            )));
        }

        Ok(self
            .results
            .read()
            .await
            .get(&(site.name.clone(), keyword.to_lowercase()))
            .cloned()
            .unwrap_or_default())
    }
}
