use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{Dataset, DatasetSummary};
use crate::config::SearchConfig;
use crate::error::{RegistryError, Result};
use crate::registry::{AttributeMatch, DatasetRegistry};

/// Search categories, declared in priority order (1 is best).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    TableName,
    ColumnName,
    SchemaName,
    DatabaseName,
}

impl MatchType {
    pub const ALL: [MatchType; 4] = [
        MatchType::TableName,
        MatchType::ColumnName,
        MatchType::SchemaName,
        MatchType::DatabaseName,
    ];

    pub fn priority(&self) -> u8 {
        match self {
            MatchType::TableName => 1,
            MatchType::ColumnName => 2,
            MatchType::SchemaName => 3,
            MatchType::DatabaseName => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::TableName => "table_name",
            MatchType::ColumnName => "column_name",
            MatchType::SchemaName => "schema_name",
            MatchType::DatabaseName => "database_name",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub dataset: Dataset,
    pub match_type: MatchType,
    pub matched_on: String,
    pub priority: u8,
    pub upstream_datasets: Vec<DatasetSummary>,
    pub downstream_datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub total: usize,
    pub results: Vec<SearchResult>,
}

/// Merges per-category lookup results into one ranked list.
///
/// `tiers` must be supplied in priority order. A dataset is kept only at the
/// first tier that produced it. The output is sorted by `(priority, fqn)` and
/// is not truncated; callers cap it after this step so that a dataset pushed
/// out of a lower tier can never resurface.
pub fn rank_matches<I>(tiers: I) -> Vec<SearchResult>
where
    I: IntoIterator<Item = (MatchType, Vec<AttributeMatch>)>,
{
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for (match_type, matches) in tiers {
        for hit in matches {
            if !seen.insert(hit.dataset.dataset.id) {
                continue;
            }
            results.push(SearchResult {
                dataset: hit.dataset.dataset,
                match_type,
                matched_on: hit.matched_on,
                priority: match_type.priority(),
                upstream_datasets: hit.dataset.upstream_datasets,
                downstream_datasets: hit.dataset.downstream_datasets,
            });
        }
    }

    results.sort_by_cached_key(|r| (r.priority, r.dataset.fqn.to_string()));
    results
}

pub struct SearchEngine<R: DatasetRegistry> {
    registry: Arc<R>,
    config: SearchConfig,
}

impl<R: DatasetRegistry> SearchEngine<R> {
    pub fn new(registry: Arc<R>, config: SearchConfig) -> Self {
        Self { registry, config }
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<SearchResponse> {
        let term = query.trim();
        if term.is_empty() {
            return Err(RegistryError::invalid("search term must not be empty"));
        }

        let limit = limit.unwrap_or(self.config.default_limit);
        if !(1..=self.config.max_limit).contains(&limit) {
            return Err(RegistryError::invalid(format!(
                "limit must be between 1 and {}, got {}",
                self.config.max_limit, limit
            )));
        }

        let mut tiers = Vec::with_capacity(MatchType::ALL.len());
        for match_type in MatchType::ALL {
            let matches = self.registry.datasets_matching(match_type, term).await?;
            debug!("Search '{}': {} lookup matched {} dataset(s)", term, match_type, matches.len());
            tiers.push((match_type, matches));
        }

        let mut results = rank_matches(tiers);
        let total = results.len();
        results.truncate(limit);

        info!("Search '{}' -> {} result(s)", term, total);
        Ok(SearchResponse {
            query: term.to_string(),
            total,
            results,
        })
    }
}
