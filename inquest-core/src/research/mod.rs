//! Research orchestration
//!
//! - [`ClarificationGate`] turns a [`ResearchRequest`] into a [`ResearchBrief`]
//! - [`Supervisor`] plans sub-topics and runs [`Researcher`]s on a [`WorkerPool`]
//! - [`Aggregator`] merges their notes into a [`Report`], which a
//!   [`ReportSynthesizer`] may rewrite; [`ReportWriter`] stores it

mod brief;
mod budget;
mod clarify;
mod notes;
mod pool;
mod prompts;
mod report;
mod request;
mod researcher;
mod summarize;
mod supervisor;
mod synthesis;
mod writer;

pub use brief::ResearchBrief;
pub use budget::IterationBudget;
pub use clarify::{
    ClarificationExchange, ClarificationGate, ClarificationOutcome, ClarificationPhase,
    ClarificationState,
};
pub use notes::{Citation, Note, NoteKind, NoteSet, Source, normalize_url, truncate_content};
pub use pool::{Delegation, DelegationResult, DelegationStatus, WorkerPool};
pub use report::{Completeness, Report, ReportMetadata, SubtaskNote, slugify};
pub use request::{ResearchRequest, Turn};
pub use researcher::{ResearchOutcome, Researcher, ResearcherSettings, Termination};
pub use summarize::SourceSummarizer;
pub use supervisor::{
    CompletionReason, Plan, PlanSignal, Supervisor, SupervisorOutcome, SupervisorSettings,
    topic_overlap,
};
pub use synthesis::ReportSynthesizer;
pub use writer::{Aggregator, DEFAULT_TOKEN_BUDGET, PublishOutcome, ReportWriter};
