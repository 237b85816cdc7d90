//! Aggregation of researcher findings into a report, and report publishing

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::brief::ResearchBrief;
use super::notes::{Citation, Note, normalize_url};
use super::report::{Completeness, Report, ReportMetadata, SubtaskNote, estimate_tokens};
use super::supervisor::SupervisorOutcome;
use crate::llm::CallPolicy;
use crate::storage::{StorageBackend, StorageError};

pub const DEFAULT_TOKEN_BUDGET: usize = 32_000;

/// A finding placed in the report, with the key used for citation dedup
struct Entry<'a> {
    section: usize,
    key: String,
    note: &'a Note,
}

impl Entry<'_> {
    fn line(&self, ordinal: usize) -> String {
        let text = self.note.content.split_whitespace().collect::<Vec<_>>().join(" ");
        format!("- {} [{}]\n", text, ordinal)
    }
}

/// Merges delegation results into one report within a token budget.
///
/// Merging is deterministic: the same outcome and timestamp always give the
/// same report.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    token_budget: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BUDGET)
    }
}

impl Aggregator {
    pub fn new(token_budget: usize) -> Self {
        Self { token_budget }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn merge(
        &self,
        brief: &ResearchBrief,
        outcome: &SupervisorOutcome,
        generated_at: DateTime<Utc>,
    ) -> Report {
        let entries: Vec<Entry<'_>> = outcome
            .results
            .iter()
            .enumerate()
            .flat_map(|(section, result)| {
                result.outcome.notes.findings().map(move |note| Entry {
                    section,
                    key: note
                        .source
                        .as_ref()
                        .map(|s| normalize_url(&s.url))
                        .unwrap_or_default(),
                    note,
                })
            })
            .collect();

        // Distinct researchers citing each source
        let mut cited_by: HashMap<&str, HashSet<usize>> = HashMap::new();
        for entry in &entries {
            cited_by.entry(&entry.key).or_default().insert(entry.section);
        }

        // Least-corroborated first; later material first among equals
        let mut drop_order: Vec<usize> = (0..entries.len()).collect();
        drop_order.sort_by_key(|&i| {
            let support = cited_by.get(entries[i].key.as_str()).map_or(0, |s| s.len());
            (support, std::cmp::Reverse(i))
        });

        let mut completeness = self.completeness(outcome);
        completeness.insufficient_data = entries.is_empty();

        let mut retained = vec![true; entries.len()];
        let mut next_drop = 0;
        let (content, citations) = loop {
            completeness.dropped_findings = next_drop;
            let (content, citations) = self.render(brief, outcome, &entries, &retained, &completeness);
            let excess = estimate_tokens(&content).saturating_sub(self.token_budget);
            if excess == 0 || next_drop >= drop_order.len() {
                break (content, citations);
            }

            let mut freed = 0;
            while freed < excess * 4 && next_drop < drop_order.len() {
                let i = drop_order[next_drop];
                retained[i] = false;
                freed += entries[i].line(0).len();
                next_drop += 1;
            }
        };

        if next_drop > 0 {
            tracing::info!(
                dropped = next_drop,
                budget = self.token_budget,
                "Dropped findings to fit the report budget"
            );
        }

        Report {
            content,
            citations,
            metadata: ReportMetadata {
                topic: brief.topic().to_string(),
                generated_at,
                run_id: outcome.run_id,
                completeness,
                synthesized: false,
            },
        }
    }

    fn completeness(&self, outcome: &SupervisorOutcome) -> Completeness {
        let mut completeness = Completeness::new(outcome.completion);
        completeness.skipped_topics = outcome.skipped_topics.clone();

        for result in &outcome.results {
            let topic = result.delegation.topic.clone();
            let research = &result.outcome;
            if result.is_failed() {
                let reason = research
                    .failures
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "no findings".to_string());
                completeness.failed.push(SubtaskNote { topic, reason });
            } else if research.is_cut_short() {
                let reason = format!("stopped after {} iteration(s)", research.iterations);
                completeness.cut_short.push(SubtaskNote { topic, reason });
            } else if research.has_failures() {
                let reason = format!("{} call(s) failed", research.failures.len());
                completeness.degraded.push(SubtaskNote { topic, reason });
            }
        }
        completeness
    }

    fn render(
        &self,
        brief: &ResearchBrief,
        outcome: &SupervisorOutcome,
        entries: &[Entry<'_>],
        retained: &[bool],
        completeness: &Completeness,
    ) -> (String, Vec<Citation>) {
        let mut ordinals: HashMap<&str, usize> = HashMap::new();
        let mut citations = Vec::new();

        let mut out = format!("# {}\n\n## Research brief\n\n{}\n\n## Findings\n", brief.topic(), brief.render());

        if entries.is_empty() {
            out.push_str("\nInsufficient data: no findings were gathered for this brief.\n");
        }

        for (section, result) in outcome.results.iter().enumerate() {
            let kept: Vec<&Entry<'_>> = entries
                .iter()
                .zip(retained)
                .filter(|(e, keep)| **keep && e.section == section)
                .map(|(e, _)| e)
                .collect();
            if kept.is_empty() {
                continue;
            }

            out.push_str(&format!("\n### {}\n\n", result.delegation.topic));
            for entry in kept {
                let ordinal = match ordinals.get(entry.key.as_str()) {
                    Some(&n) => n,
                    None => {
                        let n = citations.len() + 1;
                        let (url, title) = entry
                            .note
                            .source
                            .as_ref()
                            .map(|s| (s.url.clone(), s.title.clone()))
                            .unwrap_or_default();
                        citations.push(Citation { ordinal: n, url, title });
                        ordinals.insert(&entry.key, n);
                        n
                    }
                };
                out.push_str(&entry.line(ordinal));
            }
        }

        out.push_str(&render_appendix(completeness, &citations));
        (out, citations)
    }
}

/// The `Completeness` and `Sources` sections that close every report
pub(crate) fn render_appendix(completeness: &Completeness, citations: &[Citation]) -> String {
    let mut out = String::from("\n## Completeness\n\n");
    let annotations = completeness.annotations();
    if annotations.is_empty() {
        out.push_str("All planned sub-tasks completed.\n");
    }
    for line in annotations {
        out.push_str("- ");
        out.push_str(&line);
        out.push('\n');
    }

    if !citations.is_empty() {
        out.push_str("\n## Sources\n\n");
        for c in citations {
            let title = if c.title.trim().is_empty() { &c.url } else { &c.title };
            out.push_str(&format!("[{}] {}: {}\n", c.ordinal, title, c.url));
        }
    }
    out
}

/// Where a report ended up, plus any storage failures
#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    pub local_uri: Option<String>,
    pub remote_uri: Option<String>,
    pub warnings: Vec<StorageError>,
}

impl PublishOutcome {
    pub fn is_stored(&self) -> bool {
        self.local_uri.is_some() || self.remote_uri.is_some()
    }
}

/// Publishes reports to the configured stores
pub struct ReportWriter {
    local: Option<Arc<dyn StorageBackend>>,
    remote: Option<Arc<dyn StorageBackend>>,
    policy: CallPolicy,
}

impl ReportWriter {
    pub fn new(policy: CallPolicy) -> Self {
        Self {
            local: None,
            remote: None,
            policy,
        }
    }

    pub fn with_local(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    pub fn with_remote(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.remote = Some(backend);
        self
    }

    /// Store `report` everywhere configured. Failures become warnings; the
    /// report itself is never affected.
    pub async fn publish(&self, report: &Report) -> PublishOutcome {
        let path = report.storage_path();
        let document = report.to_document();
        let mut outcome = PublishOutcome::default();

        if let Some(ref backend) = self.local {
            match self.store(backend.as_ref(), &path, document.as_bytes()).await {
                Ok(uri) => outcome.local_uri = Some(uri),
                Err(e) => outcome.warnings.push(e),
            }
        }
        if let Some(ref backend) = self.remote {
            match self.store(backend.as_ref(), &path, document.as_bytes()).await {
                Ok(uri) => outcome.remote_uri = Some(uri),
                Err(e) => outcome.warnings.push(e),
            }
        }
        outcome
    }

    async fn store(
        &self,
        backend: &dyn StorageBackend,
        path: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let result = self
            .policy
            .run("storage", move || async move {
                backend.store(path, bytes).await.map_err(Into::into)
            })
            .await
            .map_err(|e| StorageError::from_call(e, path));

        match &result {
            Ok(uri) => tracing::info!(backend = backend.name(), uri = %uri, "Report stored"),
            Err(e) => tracing::warn!(backend = backend.name(), error = %e, "Report storage failed"),
        }
        result
    }
}
