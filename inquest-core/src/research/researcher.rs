//! Researcher: bounded search/reflect loop for one delegated sub-topic

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::brief::ResearchBrief;
use super::budget::IterationBudget;
use super::notes::{NoteSet, truncate_content};
use super::prompts;
use super::summarize::SourceSummarizer;
use crate::llm::{LLMProvider, LLMRequest, Message, ModelOutput};
use crate::search::SearchHit;
use crate::tools::{ReflectDecision, SearchArgs, ToolCall, ToolName, ToolOutput, ToolRouter};

const SUMMARY_CHARS: usize = 6_000;

/// Why a researcher stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Reflection decided the findings are enough
    Sufficient,
    /// Iteration cap reached
    BudgetExhausted,
    /// Cancellation observed at an iteration boundary
    Cancelled,
    /// A required call failed for good
    Failed,
}

/// Everything a researcher hands back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub topic: String,
    pub notes: NoteSet,
    pub iterations: usize,
    pub termination: Termination,
    /// Failed calls, in order
    pub failures: Vec<String>,
}

impl ResearchOutcome {
    /// Outcome for a worker that never produced anything
    pub fn failed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            notes: NoteSet::new(),
            iterations: 0,
            termination: Termination::Failed,
            failures: vec![reason.into()],
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Failed outright, or every call failed and nothing was found
    pub fn is_failed(&self) -> bool {
        self.termination == Termination::Failed || (self.has_failures() && self.notes.is_empty())
    }

    /// Stopped by a budget or cancellation rather than by choice
    pub fn is_cut_short(&self) -> bool {
        matches!(
            self.termination,
            Termination::BudgetExhausted | Termination::Cancelled
        )
    }
}

/// Researcher limits
#[derive(Debug, Clone)]
pub struct ResearcherSettings {
    pub max_iterations: usize,
    pub max_note_chars: usize,
    pub temperature: Option<f32>,
}

impl Default for ResearcherSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_note_chars: 2_000,
            temperature: None,
        }
    }
}

/// Runs the search/reflect loop. Stateless between runs, so one instance
/// serves every worker.
pub struct Researcher {
    llm: Arc<dyn LLMProvider>,
    router: Arc<ToolRouter>,
    settings: ResearcherSettings,
    summarizer: Option<SourceSummarizer>,
}

enum Reflection {
    /// Reflection text and an optional refined query
    Continue(String, Option<String>),
    Stop(String),
    Failed(String),
}

fn record_reflection(notes: &mut NoteSet, text: String) {
    if !text.trim().is_empty() {
        notes.push_internal(text.trim());
    }
}

impl Researcher {
    pub fn new(llm: Arc<dyn LLMProvider>, router: Arc<ToolRouter>, settings: ResearcherSettings) -> Self {
        Self {
            llm,
            router,
            settings,
            summarizer: None,
        }
    }

    /// Summarize sources longer than `max_note_chars` instead of cutting them
    pub fn with_summarizer(mut self, summarizer: SourceSummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn settings(&self) -> &ResearcherSettings {
        &self.settings
    }

    /// Research `topic` until the reflection stops, the iteration cap is hit,
    /// a required call fails, or `cancel` fires.
    pub async fn run(
        &self,
        topic: &str,
        brief: &ResearchBrief,
        cancel: &CancellationToken,
    ) -> ResearchOutcome {
        let mut budget = IterationBudget::new(self.settings.max_iterations);
        let mut notes = NoteSet::new();
        let mut failures = Vec::new();
        let mut query = topic.to_string();

        let termination = loop {
            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            if !budget.try_start() {
                break Termination::BudgetExhausted;
            }
            let iteration = budget.used();

            let search = ToolCall::Search(SearchArgs::new(query.clone()));
            let new_results = match self.router.dispatch(search).await {
                Ok(ToolOutput::SearchResults(hits)) => self.record_hits(topic, &hits, &mut notes).await,
                Ok(other) => {
                    failures.push(format!("search returned unexpected output: {:?}", other));
                    break Termination::Failed;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(topic, iteration, error = %e, "Search failed; retrying next iteration");
                    failures.push(format!("search: {}", e));
                    continue;
                }
                Err(e) => {
                    tracing::warn!(topic, iteration, error = %e, "Search failed permanently");
                    failures.push(format!("search: {}", e));
                    break Termination::Failed;
                }
            };

            tracing::debug!(topic, iteration, new_results, "Search step done");

            match self.reflect(brief, topic, &query, new_results, &notes, iteration).await {
                Reflection::Stop(text) => {
                    record_reflection(&mut notes, text);
                    break Termination::Sufficient;
                }
                Reflection::Continue(text, next) => {
                    record_reflection(&mut notes, text);
                    if let Some(next) = next {
                        query = next.trim().to_string();
                    }
                }
                Reflection::Failed(reason) => {
                    tracing::warn!(topic, iteration, error = %reason, "Reflection failed");
                    failures.push(format!("reflect: {}", reason));
                    break Termination::Failed;
                }
            }
        };

        tracing::debug!(
            topic,
            iterations = budget.used(),
            findings = notes.finding_count(),
            ?termination,
            "Researcher finished"
        );

        ResearchOutcome {
            topic: topic.to_string(),
            notes,
            iterations: budget.used(),
            termination,
            failures,
        }
    }

    /// Add unseen hits as findings; returns how many were new
    async fn record_hits(&self, topic: &str, hits: &[SearchHit], notes: &mut NoteSet) -> usize {
        let mut added = 0;
        for hit in hits {
            if notes.contains_url(&hit.url) {
                continue;
            }
            let content = self.condense(topic, hit).await;
            if notes.push_finding(hit, content) {
                added += 1;
            }
        }
        added
    }

    async fn condense(&self, topic: &str, hit: &SearchHit) -> String {
        let max_chars = self.settings.max_note_chars;
        let content = hit.content.trim();
        match &self.summarizer {
            Some(summarizer) if content.chars().count() > max_chars => {
                match summarizer.summarize(hit, max_chars).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        tracing::warn!(topic, url = %hit.url, error = %e, "Summarizing failed; truncating");
                        truncate_content(content, max_chars)
                    }
                }
            }
            _ => truncate_content(content, max_chars),
        }
    }

    async fn reflect(
        &self,
        brief: &ResearchBrief,
        topic: &str,
        query: &str,
        new_results: usize,
        notes: &NoteSet,
        iteration: usize,
    ) -> Reflection {
        let mut request = LLMRequest::from_messages(vec![
            Message::system(prompts::researcher_system(iteration, self.settings.max_iterations)),
            Message::user(prompts::researcher_user(
                brief,
                topic,
                query,
                new_results,
                &notes.summary(SUMMARY_CHARS),
            )),
        ])
        .with_tools(&[ToolName::Reflect]);
        if let Some(t) = self.settings.temperature {
            request = request.with_temperature(t);
        }

        let response = match self.llm.complete(&request).await {
            Ok(response) => response,
            Err(e) => return Reflection::Failed(e.to_string()),
        };

        let calls = match response.output {
            // Plain text means the model has nothing more to search for
            ModelOutput::Text(text) => return Reflection::Stop(text),
            ModelOutput::ToolCalls(calls) => calls,
        };
        let Some(call) = calls.first() else {
            return Reflection::Stop(String::new());
        };

        match self.router.invoke(&call.name, &call.arguments).await {
            Ok(ToolOutput::Reflection(args)) => {
                let text = args.reflection.trim().to_string();
                match args.decision {
                    ReflectDecision::Stop => Reflection::Stop(text),
                    ReflectDecision::Continue => Reflection::Continue(text, args.next_query),
                }
            }
            Ok(other) => Reflection::Failed(format!(
                "expected a reflection, got {:?}",
                other
            )),
            Err(e) => Reflection::Failed(e.to_string()),
        }
    }
}
