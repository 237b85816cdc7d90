//! Tool error model
//!
//! Every failed tool invocation or capability call is reported as a [`ToolError`]
//! whose [`ToolErrorKind`] decides whether the call may be retried.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Structured tool error with taxonomy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    /// Error kind (determines retryability)
    pub kind: ToolErrorKind,

    /// Human-readable error message
    pub message: String,

    /// Underlying error code (if applicable)
    pub code: Option<String>,

    /// Additional context
    pub context: Option<Value>,
}

impl ToolError {
    /// Create a new tool error
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            context: None,
        }
    }

    /// Add an error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Create a validation error
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self {
            kind: ToolErrorKind::Validation,
            message: format!(
                "Validation failed: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
            code: Some("VALIDATION_FAILED".to_string()),
            context: Some(serde_json::to_value(&errors).unwrap_or_default()),
        }
    }

    /// Create an unknown-tool error
    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ToolErrorKind::Validation, format!("Unknown tool: {}", name))
            .with_code("UNKNOWN_TOOL")
    }

    /// Create a timeout error
    pub fn timeout(duration: Duration) -> Self {
        Self {
            kind: ToolErrorKind::Timeout,
            message: format!("Call timed out after {:?}", duration),
            code: Some("TIMEOUT".to_string()),
            context: Some(serde_json::json!({ "timeout_ms": duration.as_millis() as u64 })),
        }
    }

    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transient, message).with_code("TRANSIENT")
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, message).with_code("INTERNAL_ERROR")
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Cancelled, reason).with_code("CANCELLED")
    }

    /// Map an HTTP status from a capability endpoint to an error kind
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            408 => ToolErrorKind::Timeout,
            429 => ToolErrorKind::RateLimited,
            401 | 403 => ToolErrorKind::PermissionDenied,
            404 => ToolErrorKind::NotFound,
            400..=499 => ToolErrorKind::Validation,
            500..=599 => ToolErrorKind::Transient,
            _ => ToolErrorKind::InvalidResponse,
        };
        Self::new(kind, message).with_code(format!("HTTP_{}", status))
    }

    /// Whether the failure is worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Error kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Input validation failed (not retryable - fix args)
    Validation,

    /// Execution timed out (retryable)
    Timeout,

    /// Rate limit exceeded (retryable after delay)
    RateLimited,

    /// Transient network/service error (retryable)
    Transient,

    /// Resource not found (not retryable)
    NotFound,

    /// Permission denied by external system (not retryable)
    PermissionDenied,

    /// Invalid response from external system (may be retryable)
    InvalidResponse,

    /// Internal tool error (not retryable - bug)
    Internal,

    /// Cancelled by user/system (not retryable)
    Cancelled,
}

impl ToolErrorKind {
    /// Check if this error kind is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolErrorKind::Timeout
                | ToolErrorKind::RateLimited
                | ToolErrorKind::Transient
                | ToolErrorKind::InvalidResponse
        )
    }

    /// Check if this error kind is fatal (never retry)
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

/// Validation error for a specific field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field path (e.g., "args.query")
    pub field: String,

    /// Error message
    pub message: String,

    /// Error code
    pub code: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: None,
        }
    }

    /// Add an error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref code) = self.code {
            write!(f, "[{}] {}: {}", code, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_retryability() {
        assert!(ToolErrorKind::Timeout.is_retryable());
        assert!(ToolErrorKind::RateLimited.is_retryable());
        assert!(ToolErrorKind::Transient.is_retryable());
        assert!(!ToolErrorKind::Validation.is_retryable());
        assert!(ToolErrorKind::Cancelled.is_fatal());
    }

    #[test]
    fn test_validation_error_message() {
        let err = ToolError::validation(vec![
            ValidationError::new("query", "must not be empty").with_code("EMPTY"),
            ValidationError::new("max_results", "must be positive"),
        ]);

        assert_eq!(err.kind, ToolErrorKind::Validation);
        assert!(err.message.contains("[EMPTY] query: must not be empty"));
        assert!(err.message.contains("max_results: must be positive"));
        assert!(err.context.is_some());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ToolError::from_status(429, "x").kind, ToolErrorKind::RateLimited);
        assert_eq!(ToolError::from_status(503, "x").kind, ToolErrorKind::Transient);
        assert_eq!(ToolError::from_status(401, "x").kind, ToolErrorKind::PermissionDenied);
        assert_eq!(ToolError::from_status(400, "x").kind, ToolErrorKind::Validation);
        assert_eq!(ToolError::from_status(302, "x").kind, ToolErrorKind::InvalidResponse);
        assert_eq!(
            ToolError::from_status(404, "x").code.as_deref(),
            Some("HTTP_404")
        );
    }
}
