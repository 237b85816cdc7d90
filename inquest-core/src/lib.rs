//! # Inquest - Multi-Agent Research Orchestration
//!
//! Inquest turns a loosely specified research request into a cited Markdown
//! report:
//! - Clarification of vague requests (at most 3 questions)
//! - Supervised decomposition into sub-topics, researched concurrently
//! - Bounded search/reflect loops per researcher
//! - A closed tool set (`search`, `reflect`, `delegate`, `complete`)
//! - Deduplicated citations and a token-budgeted report
//! - Local and remote report storage
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inquest_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(InquestConfig::load()?);
//!     let session = ResearchSession::builder(config).build()?;
//!
//!     let outcome = session
//!         .run("Recent advances in quantum computing hardware", &NoPrompt)
//!         .await?;
//!     println!("{}", outcome.report.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `llm-openai`: OpenAI-compatible reasoning provider (default)
//! - `search-tavily`: Tavily search provider (default)

pub mod config;
pub mod error;
pub mod llm;
pub mod research;
pub mod search;
pub mod session;
pub mod storage;
pub mod tools;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        CapabilityConfig, InquestConfig, LLMProviderConfig, ResearchConfig, SearchConfig,
        StorageConfig,
    };
    pub use crate::error::{InquestError, Result};
    pub use crate::llm::{
        CallPolicy, LLMProvider, LLMProviderFactory, LLMRequest, LLMResponse, Message,
        MessageRole, RetryConfig, ScriptedProvider,
    };
    pub use crate::research::{
        Aggregator, Citation, ClarificationGate, ClarificationOutcome, ClarificationState,
        CompletionReason, Completeness, Delegation, DelegationResult, NoteSet, PublishOutcome,
        Report, ReportWriter, ResearchBrief, ResearchOutcome, ResearchRequest, Researcher,
        Supervisor, SupervisorOutcome, Termination, WorkerPool,
    };
    pub use crate::search::{ScriptedSearch, SearchHit, SearchProvider};
    pub use crate::session::{NoPrompt, ResearchSession, SessionOutcome, UserPrompt};
    pub use crate::storage::{
        HttpStorage, InMemoryStorage, LocalStorage, StorageBackend, StorageError,
    };
    pub use crate::tools::{ToolCall, ToolError, ToolErrorKind, ToolName, ToolRouter};
}
