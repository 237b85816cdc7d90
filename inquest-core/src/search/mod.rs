//! Web search capability
//!
//! Researchers reach search only through the tool router, which wraps every
//! [`SearchProvider`] call in the configured call policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{SearchConfig, SearchProviderKind};
use crate::error::Result;

pub mod scripted;
#[cfg(feature = "search-tavily")]
pub mod tavily;

pub use scripted::ScriptedSearch;
#[cfg(feature = "search-tavily")]
pub use tavily::TavilySearch;

/// A single search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    /// Extracted page content or snippet
    pub content: String,
}

impl SearchHit {
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Trait for search capability implementations
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a query, returning at most `max_results` hits in provider order
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Provider name for logging
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Build the configured search provider
pub fn from_config(config: &SearchConfig) -> Result<Arc<dyn SearchProvider>> {
    match config.provider {
        #[cfg(feature = "search-tavily")]
        SearchProviderKind::Tavily => {
            let search = match &config.api_key {
                Some(key) => TavilySearch::new(key.clone()),
                None => TavilySearch::from_env()?,
            };
            let search = match &config.base_url {
                Some(url) => search.with_base_url(url.clone()),
                None => search,
            };
            Ok(Arc::new(search.with_topic(config.topic.clone())))
        }

        #[cfg(not(feature = "search-tavily"))]
        SearchProviderKind::Tavily => Err(crate::error::InquestError::Configuration(
            "Tavily search requires 'search-tavily' feature".to_string(),
        )),
    }
}
