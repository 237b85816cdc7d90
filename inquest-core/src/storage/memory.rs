use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{StorageBackend, StorageError, validate_path};

/// In-memory store, optionally failing every write
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    fail_with: Option<StorageError>,
    attempts: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every write fails with `error`
    pub fn failing(error: StorageError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Number of store calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn store(&self, path: &str, content: &[u8]) -> Result<String, StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        validate_path(path)?;

        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }

        self.objects
            .write()
            .await
            .insert(path.to_string(), content.to_vec());
        Ok(format!("memory://{}", path))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
