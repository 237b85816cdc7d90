//! Error types for Inquest operations

use crate::research::Report;
use crate::storage::StorageError;
use crate::tools::ToolError;

/// Result type for Inquest operations
pub type Result<T> = std::result::Result<T, InquestError>;

/// Error types for the research engine
#[derive(Debug, thiserror::Error)]
pub enum InquestError {
    /// Malformed or empty request/brief; no research is attempted
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// A tool call was rejected or a capability call failed
    #[error("Tool invocation failed: {0}")]
    ToolInvocation(#[from] ToolError),

    /// Storage capability failure (non-fatal at the session level)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The supervisor could not continue; carries whatever report could be built
    #[error("Research run failed: {reason}")]
    RunFailed {
        reason: String,
        partial: Option<Box<Report>>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl InquestError {
    /// Whether a retry of the failed call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            InquestError::ToolInvocation(e) => e.kind.is_retryable(),
            InquestError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Collapse into a [`ToolError`], keeping the kind when one is known
    pub fn into_tool_error(self) -> ToolError {
        match self {
            InquestError::ToolInvocation(e) => e,
            InquestError::InputValidation(msg) => ToolError::new(
                crate::tools::ToolErrorKind::Validation,
                msg,
            ),
            other => ToolError::internal(other.to_string()),
        }
    }

    /// Partial report attached to a fatal run failure, if any
    pub fn partial_report(&self) -> Option<&Report> {
        match self {
            InquestError::RunFailed { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}

impl From<String> for InquestError {
    fn from(s: String) -> Self {
        InquestError::Other(s)
    }
}

impl From<&str> for InquestError {
    fn from(s: &str) -> Self {
        InquestError::Other(s.to_string())
    }
}
