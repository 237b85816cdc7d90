//! Scripted reasoning provider for deterministic runs
//!
//! Answers every request through a responder closure, recording what it was
//! asked. Used by tests and offline dry runs where no model endpoint exists.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::llm::{LLMProvider, LLMRequest, LLMResponse, ModelInfo};

type Responder = dyn Fn(&LLMRequest) -> Result<LLMResponse> + Send + Sync;

/// A provider that returns scripted responses
pub struct ScriptedProvider {
    responder: Box<Responder>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    call_history: Arc<RwLock<Vec<LLMRequest>>>,
}

impl ScriptedProvider {
    /// Create a provider that answers through `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&LLMRequest) -> Result<LLMResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            call_count: AtomicUsize::new(0),
            call_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a provider that replays `responses` in order, repeating the last
    pub fn with_responses(responses: Vec<LLMResponse>) -> Self {
        let cursor = AtomicUsize::new(0);
        Self::new(move |_| {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            responses
                .get(index)
                .or_else(|| responses.last())
                .cloned()
                .ok_or_else(|| "Scripted provider has no responses".into())
        })
    }

    /// Add a simulated latency to every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times this provider has been called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get the call history (requests passed to each call)
    pub async fn call_history(&self) -> Vec<LLMRequest> {
        self.call_history.read().await.clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.call_history.write().await.push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.responder)(request)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted".to_string(),
            model_name: "scripted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_repeats_last() {
        let provider = ScriptedProvider::with_responses(vec![
            LLMResponse::text_response("one"),
            LLMResponse::text_response("two"),
        ]);
        let request = LLMRequest::from_prompt("x");

        let mut texts = Vec::new();
        for _ in 0..3 {
            let response = provider.complete(&request).await.unwrap();
            texts.push(response.text().unwrap().to_string());
        }

        assert_eq!(texts, vec!["one", "two", "two"]);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.call_history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_script_errors() {
        let provider = ScriptedProvider::with_responses(Vec::new());
        assert!(provider.complete(&LLMRequest::from_prompt("x")).await.is_err());
    }
}
