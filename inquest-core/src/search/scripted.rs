//! Scripted search provider for deterministic runs

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::search::{SearchHit, SearchProvider};

type Responder = dyn Fn(&str) -> Result<Vec<SearchHit>> + Send + Sync;

/// A search provider that answers through a closure
pub struct ScriptedSearch {
    responder: Box<Responder>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    queries: Arc<RwLock<Vec<String>>>,
}

impl ScriptedSearch {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<SearchHit>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            call_count: AtomicUsize::new(0),
            queries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Answer every query with no results
    pub fn empty() -> Self {
        Self::new(|_| Ok(Vec::new()))
    }

    /// Add a simulated latency to every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Queries received, in call order
    pub async fn queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.queries.write().await.push(query.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut hits = (self.responder)(query)?;
        hits.truncate(max_results);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
