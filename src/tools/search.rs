//! Evidence providers
//!
//! Research workers gather sources through the [`EvidenceProvider`] trait.
//! The live provider searches the web via the daedra crate (DuckDuckGo
//! backend); the no-op provider always succeeds with no results, which lets
//! the whole pipeline run offline.

use crate::types::{SearchError, SearchHit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source of ranked search results for a research query.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Run a query and return at most `max_results` hits, best first.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Which evidence provider the pipeline uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    /// Live web search
    #[default]
    Live,
    /// No web search; every query returns an empty result set
    Noop,
}

impl SearchProviderKind {
    /// Build the provider. Without the `web-search` feature, `Live` degrades
    /// to the no-op provider with a warning.
    pub fn build(self) -> Arc<dyn EvidenceProvider> {
        match self {
            SearchProviderKind::Noop => Arc::new(NoopSearch),
            #[cfg(feature = "web-search")]
            SearchProviderKind::Live => Arc::new(WebSearch::new()),
            #[cfg(not(feature = "web-search"))]
            SearchProviderKind::Live => {
                tracing::warn!("Built without the web-search feature; using the no-op search provider");
                Arc::new(NoopSearch)
            }
        }
    }
}

impl std::str::FromStr for SearchProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" | "web" | "tavily" | "duckduckgo" => Ok(SearchProviderKind::Live),
            "noop" | "none" | "off" => Ok(SearchProviderKind::Noop),
            other => Err(format!("Unsupported search provider: {}", other)),
        }
    }
}

/// Evidence provider that never returns results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearch;

#[async_trait]
impl EvidenceProvider for NoopSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Web search powered by daedra
#[cfg(feature = "web-search")]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSearch;

#[cfg(feature = "web-search")]
impl WebSearch {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "web-search")]
#[async_trait]
impl EvidenceProvider for WebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: max_results,
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| SearchError::ProviderUnavailable(format!("Search failed: {}", e)))?;

        let hits: Vec<SearchHit> = response
            .data
            .iter()
            .filter(|r| !r.url.trim().is_empty())
            .take(max_results)
            .map(|r| SearchHit {
                url: r.url.trim().to_string(),
                title: r.title.trim().to_string(),
                snippet: r.description.clone(),
            })
            .collect();

        tracing::debug!(query, hits = hits.len(), "Web search complete");
        Ok(hits)
    }

    fn name(&self) -> &str {
        "web"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_returns_empty() {
        let provider = NoopSearch;
        let hits = provider.search("renewable subsidies", 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(provider.name(), "noop");
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("live".parse::<SearchProviderKind>().unwrap(), SearchProviderKind::Live);
        assert_eq!("NOOP".parse::<SearchProviderKind>().unwrap(), SearchProviderKind::Noop);
        assert!("bing".parse::<SearchProviderKind>().is_err());
    }

    #[test]
    fn test_noop_kind_builds_noop_provider() {
        assert_eq!(SearchProviderKind::Noop.build().name(), "noop");
    }
}
