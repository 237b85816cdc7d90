//! Tavily search adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{InquestError, Result};
use crate::search::{SearchHit, SearchProvider};
use crate::tools::{ToolError, ToolErrorKind};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Search through the Tavily API
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    topic: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            topic: "general".to_string(),
        }
    }

    /// Create from `TAVILY_API_KEY`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| {
            InquestError::Configuration("TAVILY_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search topic ("general", "news" or "finance")
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    topic: &'a str,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/search", self.base_url);
        let body = TavilyRequest {
            query,
            max_results,
            topic: &self.topic,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::transient(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::from_status(
                status.as_u16(),
                format!("Tavily error ({}): {}", status, text),
            )
            .into());
        }

        let parsed: TavilyResponse = response.json().await.map_err(|e| {
            ToolError::new(
                ToolErrorKind::InvalidResponse,
                format!("Failed to parse Tavily response: {}", e),
            )
        })?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit::new(r.url, r.title, r.content))
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
