//! Condensing long search results before they become findings

use serde::Deserialize;
use std::sync::Arc;

use super::notes::truncate_content;
use super::prompts;
use crate::error::{InquestError, Result};
use crate::llm::{LLMProvider, LLMRequest, Message, generate_structured_output};
use crate::search::SearchHit;

/// Longest page text handed to the summarizer, in characters
const MAX_SOURCE_CHARS: usize = 40_000;

#[derive(Debug, Deserialize)]
struct SourceSummary {
    summary: String,
    #[serde(default)]
    key_excerpts: String,
}

/// Asks the reasoning capability for a short summary of one source.
///
/// Callers fall back to plain truncation when summarizing fails, so a broken
/// summarizer only costs detail, never findings.
pub struct SourceSummarizer {
    llm: Arc<dyn LLMProvider>,
    temperature: Option<f32>,
}

impl SourceSummarizer {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            llm,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Summary of `hit` with its key excerpts, at most `max_chars` long.
    ///
    /// # Errors
    ///
    /// Fails when the call fails or the reply has no usable summary.
    pub async fn summarize(&self, hit: &SearchHit, max_chars: usize) -> Result<String> {
        let page = truncate_content(hit.content.trim(), MAX_SOURCE_CHARS);
        let mut request = LLMRequest::from_messages(vec![
            Message::system(prompts::summarize_system(max_chars)),
            Message::user(prompts::summarize_user(&hit.title, &hit.url, &page)),
        ]);
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }

        let parsed: SourceSummary = generate_structured_output(self.llm.as_ref(), &request).await?;
        let summary = parsed.summary.trim();
        if summary.is_empty() {
            return Err(InquestError::Other(format!("empty summary for {}", hit.url)));
        }

        let mut text = summary.to_string();
        let excerpts = parsed.key_excerpts.trim();
        if !excerpts.is_empty() {
            text.push_str("\n\nKey excerpts: ");
            text.push_str(excerpts);
        }
        Ok(truncate_content(&text, max_chars))
    }
}
