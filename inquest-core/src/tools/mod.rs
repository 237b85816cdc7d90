//! Research tools
//!
//! The closed tool set (`search`, `reflect`, `delegate`, `complete`), its error
//! taxonomy, and the router that validates and dispatches calls.

mod call;
mod result;
mod router;

pub use call::{
    CompleteArgs, DelegateArgs, MAX_SEARCH_RESULTS, ReflectArgs, ReflectDecision, SearchArgs,
    ToolCall, ToolName, ToolSchema, ToolSpec,
};
pub use result::{ToolError, ToolErrorKind, ValidationError};
pub use router::{DEFAULT_SEARCH_RESULTS, ToolOutput, ToolRouter};
