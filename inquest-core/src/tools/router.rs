//! Tool router
//!
//! Single entry point for tool calls requested by the reasoning capability.
//! Calls are parsed into [`ToolCall`] first, so unknown tools and malformed
//! arguments are rejected before any capability runs. The router also owns the
//! worker slots that bound how many researchers run at once.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::call::{CompleteArgs, DelegateArgs, ReflectArgs, SearchArgs, ToolCall, ToolName, ToolSpec};
use super::result::ToolError;
use crate::llm::CallPolicy;
use crate::search::{SearchHit, SearchProvider};

/// Default number of hits per search when the call does not ask for one
pub const DEFAULT_SEARCH_RESULTS: usize = 3;

/// Structured result of a routed tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Hits returned by the search capability
    SearchResults(Vec<SearchHit>),

    /// A reflection and its continue/stop decision
    Reflection(ReflectArgs),

    /// Topics accepted for dispatch, and those beyond the concurrency cap
    Delegations {
        accepted: Vec<String>,
        overflow: Vec<String>,
    },

    /// Research declared complete
    Completed { summary: Option<String> },
}

/// Validates and dispatches research tool calls
pub struct ToolRouter {
    search: Arc<dyn SearchProvider>,
    policy: CallPolicy,
    search_results: usize,
    concurrency_cap: usize,
    slots: Arc<Semaphore>,
}

impl ToolRouter {
    /// Create a router whose delegate cap and worker slots are `concurrency_cap`
    pub fn new(search: Arc<dyn SearchProvider>, policy: CallPolicy, concurrency_cap: usize) -> Self {
        let concurrency_cap = concurrency_cap.max(1);
        Self {
            search,
            policy,
            search_results: DEFAULT_SEARCH_RESULTS,
            concurrency_cap,
            slots: Arc::new(Semaphore::new(concurrency_cap)),
        }
    }

    /// Hits requested per search when the call leaves `max_results` unset
    pub fn with_search_results(mut self, n: usize) -> Self {
        self.search_results = n.clamp(1, super::call::MAX_SEARCH_RESULTS);
        self
    }

    pub fn concurrency_cap(&self) -> usize {
        self.concurrency_cap
    }

    /// Worker slots not currently held
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a worker slot. Every running researcher holds one.
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, ToolError> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ToolError::cancelled("Worker slots closed"))
    }

    /// JSON schemas for the given tools, as offered to the reasoning capability
    pub fn tool_specs(tools: &[ToolName]) -> Vec<ToolSpec> {
        tools.iter().map(|t| t.spec()).collect()
    }

    /// Parse and run a raw tool call
    pub async fn invoke(&self, name: &str, args: &Value) -> Result<ToolOutput, ToolError> {
        let call = ToolCall::parse(name, args).inspect_err(|e| {
            tracing::debug!(tool = name, error = %e, "Rejected tool call");
        })?;
        self.dispatch(call).await
    }

    /// Run an already validated tool call
    pub async fn dispatch(&self, call: ToolCall) -> Result<ToolOutput, ToolError> {
        tracing::debug!(
            tool = call.name().as_str(),
            args_hash = %args_hash(&call.args()),
            "Dispatching tool call"
        );

        match call {
            ToolCall::Search(args) => self.run_search(args).await,
            ToolCall::Reflect(args) => Ok(ToolOutput::Reflection(args)),
            ToolCall::Delegate(args) => Ok(self.split_delegations(args)),
            ToolCall::Complete(CompleteArgs { summary }) => Ok(ToolOutput::Completed { summary }),
        }
    }

    async fn run_search(&self, args: SearchArgs) -> Result<ToolOutput, ToolError> {
        let max_results = args.max_results.unwrap_or(self.search_results);
        let query = args.query.trim();
        let search = &self.search;

        let hits = self
            .policy
            .run("search", move || search.search(query, max_results))
            .await
            .map_err(|e| e.into_tool_error())?;

        tracing::debug!(
            provider = self.search.name(),
            query,
            hits = hits.len(),
            "Search completed"
        );
        Ok(ToolOutput::SearchResults(hits))
    }

    fn split_delegations(&self, args: DelegateArgs) -> ToolOutput {
        let mut topics: Vec<String> = args.topics.into_iter().map(|t| t.trim().to_string()).collect();
        let overflow = if topics.len() > self.concurrency_cap {
            topics.split_off(self.concurrency_cap)
        } else {
            Vec::new()
        };

        if !overflow.is_empty() {
            tracing::warn!(
                cap = self.concurrency_cap,
                dropped = overflow.len(),
                "Delegation exceeds concurrency cap; extra topics not run"
            );
        }

        ToolOutput::Delegations {
            accepted: topics,
            overflow,
        }
    }
}

fn args_hash(args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(args.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
