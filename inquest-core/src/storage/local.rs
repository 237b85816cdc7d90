use async_trait::async_trait;
use std::path::PathBuf;

use super::{StorageBackend, StorageError, validate_path};

/// Stores reports under a directory on local disk
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn store(&self, path: &str, content: &[u8]) -> Result<String, StorageError> {
        validate_path(path)?;
        let target = self.root.join(path);

        let io_err = |e: std::io::Error| StorageError::Io {
            path: target.display().to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&target, content).await.map_err(io_err)?;

        let absolute = tokio::fs::canonicalize(&target).await.unwrap_or(target.clone());
        Ok(format!("file://{}", absolute.display()))
    }

    fn name(&self) -> &str {
        "local"
    }
}
