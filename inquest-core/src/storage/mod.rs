//! Report storage capability
//!
//! Storage failures never invalidate a report. The writer collects them as
//! warnings on the publish outcome.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::InquestError;
use crate::tools::ToolErrorKind;

mod http;
mod local;
mod memory;

pub use http::HttpStorage;
pub use local::LocalStorage;
pub use memory::InMemoryStorage;

/// Storage failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    /// Path is empty, absolute, or escapes the storage root
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    /// Local filesystem failure
    #[error("Failed to write {path}: {message}")]
    Io { path: String, message: String },

    /// Remote store answered with a non-success status
    #[error("Remote store rejected {path} ({status}): {message}")]
    Rejected {
        path: String,
        status: u16,
        message: String,
    },

    /// Remote store could not be reached
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Unreachable(_) | StorageError::Timeout(_) => true,
            StorageError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Recover the storage failure from an error produced under a call policy
    pub fn from_call(err: InquestError, path: &str) -> Self {
        match err {
            InquestError::Storage(e) => e,
            InquestError::ToolInvocation(e) if e.kind == ToolErrorKind::Timeout => {
                let timeout = e
                    .context
                    .as_ref()
                    .and_then(|c| c.get("timeout_ms"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_millis)
                    .unwrap_or_default();
                StorageError::Timeout(timeout)
            }
            other => StorageError::Io {
                path: path.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Trait for storage capability implementations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `content` under the relative `path`, returning a URI for it
    async fn store(&self, path: &str, content: &[u8]) -> Result<String, StorageError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Reject paths that are empty, absolute, or contain `..`
pub(crate) fn validate_path(path: &str) -> Result<(), StorageError> {
    let trimmed = path.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('/')
        || trimmed.starts_with('\\')
        || trimmed.split(['/', '\\']).any(|part| part == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
