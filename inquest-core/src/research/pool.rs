//! Bounded worker pool for researcher runs
//!
//! Every delegation gets its own task, but a task only starts researching once
//! it holds a worker slot from the router, so at most `cap` researchers run at
//! any moment. [`WorkerPool::run`] returns only after every task has finished.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::brief::ResearchBrief;
use super::researcher::{ResearchOutcome, Researcher};
use crate::tools::ToolRouter;

/// Lifecycle of a delegation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// One sub-topic assigned to one researcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: String,
    pub topic: String,
    /// Worker that ran it, once assigned
    pub worker: Option<String>,
    pub status: DelegationStatus,
}

impl Delegation {
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            worker: None,
            status: DelegationStatus::Pending,
        }
    }
}

/// A finished delegation and what its researcher produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationResult {
    pub delegation: Delegation,
    pub outcome: ResearchOutcome,
}

impl DelegationResult {
    fn settle(mut delegation: Delegation, outcome: ResearchOutcome) -> Self {
        delegation.status = if outcome.is_failed() {
            DelegationStatus::Failed
        } else {
            DelegationStatus::Complete
        };
        Self { delegation, outcome }
    }

    pub fn is_failed(&self) -> bool {
        self.delegation.status == DelegationStatus::Failed
    }
}

/// Runs delegations concurrently under the router's worker slots
#[derive(Clone)]
pub struct WorkerPool {
    router: Arc<ToolRouter>,
    researcher: Arc<Researcher>,
}

impl WorkerPool {
    pub fn new(router: Arc<ToolRouter>, researcher: Arc<Researcher>) -> Self {
        Self { router, researcher }
    }

    pub fn capacity(&self) -> usize {
        self.router.concurrency_cap()
    }

    /// Run every delegation and wait for all of them.
    ///
    /// Results come back in completion order. A worker that panics or loses
    /// its slot yields a failed result; it never affects its siblings.
    pub async fn run(
        &self,
        delegations: Vec<Delegation>,
        brief: Arc<ResearchBrief>,
        cancel: &CancellationToken,
    ) -> Vec<DelegationResult> {
        let mut running = FuturesUnordered::new();

        for (slot, delegation) in delegations.into_iter().enumerate() {
            let router = self.router.clone();
            let researcher = self.researcher.clone();
            let brief = brief.clone();
            let cancel = cancel.clone();
            let mut assigned = delegation;
            assigned.worker = Some(format!("worker-{}", slot));

            let handle = tokio::spawn({
                let mut delegation = assigned.clone();
                async move {
                    let _permit = match router.acquire_slot().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return DelegationResult::settle(
                                delegation.clone(),
                                ResearchOutcome::failed(&delegation.topic, e.to_string()),
                            );
                        }
                    };

                    delegation.status = DelegationStatus::Running;
                    tracing::debug!(
                        delegation = %delegation.id,
                        worker = ?delegation.worker,
                        topic = %delegation.topic,
                        "Researcher started"
                    );
                    let outcome = researcher.run(&delegation.topic, &brief, &cancel).await;
                    DelegationResult::settle(delegation, outcome)
                }
            });

            running.push(async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(delegation = %assigned.id, error = %e, "Researcher task panicked");
                        let reason = format!("worker task failed: {}", e);
                        DelegationResult::settle(
                            assigned.clone(),
                            ResearchOutcome::failed(&assigned.topic, reason),
                        )
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(running.len());
        while let Some(result) = running.next().await {
            if result.is_failed() {
                tracing::warn!(
                    delegation = %result.delegation.id,
                    failures = result.outcome.failures.len(),
                    "Delegation failed"
                );
            }
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::{CallPolicy, LLMResponse, RetryConfig, ScriptedProvider};
    use crate::research::researcher::ResearcherSettings;
    use crate::search::{SearchHit, SearchProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Search that tracks the peak number of concurrent calls
    struct GaugedSearch {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for GaugedSearch {
        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if query.contains("poison") {
                panic!("search blew up");
            }
            Ok(vec![SearchHit::new(
                format!("https://{}.test", query.replace(' ', "-")),
                query,
                "content",
            )])
        }
    }

    fn pool(search: Arc<GaugedSearch>, cap: usize) -> WorkerPool {
        let policy = CallPolicy::new(Duration::from_secs(5), RetryConfig::no_retry());
        let router = Arc::new(ToolRouter::new(search, policy, cap));
        let llm = Arc::new(ScriptedProvider::new(|_| {
            Ok(LLMResponse::text_response("done"))
        }));
        let researcher = Arc::new(Researcher::new(llm, router.clone(), ResearcherSettings::default()));
        WorkerPool::new(router, researcher)
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_cap() {
        let search = Arc::new(GaugedSearch {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = pool(search.clone(), 2);

        let delegations = (0..6)
            .map(|i| Delegation::new(format!("d{}", i), format!("topic {}", i)))
            .collect();
        let brief = Arc::new(ResearchBrief::new("brief").unwrap());
        let results = pool.run(delegations, brief, &CancellationToken::new()).await;

        assert_eq!(results.len(), 6);
        assert!(search.peak.load(Ordering::SeqCst) <= 2);
        assert!(results.iter().all(|r| r.delegation.status == DelegationStatus::Complete));
        assert!(results.iter().all(|r| r.delegation.worker.is_some()));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_isolated() {
        let search = Arc::new(GaugedSearch {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = pool(search, 3);

        let delegations = vec![
            Delegation::new("ok-1", "fine topic"),
            Delegation::new("bad", "poison topic"),
            Delegation::new("ok-2", "another topic"),
        ];
        let brief = Arc::new(ResearchBrief::new("brief").unwrap());
        let results = pool.run(delegations, brief, &CancellationToken::new()).await;

        assert_eq!(results.len(), 3);
        let failed: Vec<_> = results.iter().filter(|r| r.is_failed()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].delegation.id, "bad");
        assert_eq!(failed[0].delegation.status, DelegationStatus::Failed);
    }
}
