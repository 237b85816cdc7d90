//! Final report and its completeness annotations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notes::Citation;
use super::supervisor::CompletionReason;

const MAX_SLUG_CHARS: usize = 60;

/// A sub-task that did not run to a natural end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskNote {
    pub topic: String,
    pub reason: String,
}

/// What the report is missing, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub completion: CompletionReason,
    /// Sub-tasks that produced nothing usable
    pub failed: Vec<SubtaskNote>,
    /// Sub-tasks stopped by a budget or cancellation
    pub cut_short: Vec<SubtaskNote>,
    /// Sub-tasks that finished but lost some calls along the way
    pub degraded: Vec<SubtaskNote>,
    /// Planned topics that never ran
    pub skipped_topics: Vec<String>,
    /// Findings omitted to fit the token budget
    pub dropped_findings: usize,
    /// No findings were gathered at all
    pub insufficient_data: bool,
}

impl Completeness {
    pub fn new(completion: CompletionReason) -> Self {
        Self {
            completion,
            failed: Vec::new(),
            cut_short: Vec::new(),
            degraded: Vec::new(),
            skipped_topics: Vec::new(),
            dropped_findings: 0,
            insufficient_data: false,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped_findings > 0
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_natural()
            && self.failed.is_empty()
            && self.cut_short.is_empty()
            && self.degraded.is_empty()
            && self.skipped_topics.is_empty()
            && !self.is_truncated()
            && !self.insufficient_data
    }

    /// One line per gap, in a stable order
    pub fn annotations(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.completion.is_natural() {
            lines.push(format!("Research stopped early: {}.", self.completion.describe()));
        }
        if self.insufficient_data {
            lines.push("Insufficient data: no findings were gathered for this brief.".to_string());
        }
        for note in &self.failed {
            lines.push(format!("Sub-task \"{}\" failed: {}.", note.topic, note.reason));
        }
        for note in &self.cut_short {
            lines.push(format!("Sub-task \"{}\" was cut short: {}.", note.topic, note.reason));
        }
        for note in &self.degraded {
            lines.push(format!("Sub-task \"{}\" is incomplete: {}.", note.topic, note.reason));
        }
        if !self.skipped_topics.is_empty() {
            lines.push(format!(
                "Topics not researched: {}.",
                self.skipped_topics.join(", ")
            ));
        }
        if self.is_truncated() {
            lines.push(format!(
                "{} finding(s) omitted to fit the report size budget.",
                self.dropped_findings
            ));
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub topic: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub completeness: Completeness,
    /// Body rewritten by the reasoning capability over the merged findings
    #[serde(default)]
    pub synthesized: bool,
}

/// Markdown report with its ordered citation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub content: String,
    pub citations: Vec<Citation>,
    pub metadata: ReportMetadata,
}

impl Report {
    /// Same chars/4 heuristic used everywhere else
    pub fn estimate_tokens(&self) -> usize {
        estimate_tokens(&self.content)
    }

    pub fn is_complete(&self) -> bool {
        self.metadata.completeness.is_complete()
    }

    /// Relative storage path: `reports/<timestamp>-<slug>.md`
    pub fn storage_path(&self) -> String {
        format!(
            "reports/{}-{}.md",
            self.metadata.generated_at.format("%Y%m%dT%H%M%SZ"),
            slugify(&self.metadata.topic)
        )
    }

    /// Stored form: a small front-matter header, then the content
    pub fn to_document(&self) -> String {
        format!(
            "---\ntopic: {}\ngenerated_at: {}\nrun_id: {}\ncomplete: {}\nsynthesized: {}\ncitations: {}\n---\n\n{}",
            self.metadata.topic.replace('\n', " "),
            self.metadata.generated_at.to_rfc3339(),
            self.metadata.run_id,
            self.is_complete(),
            self.metadata.synthesized,
            self.citations.len(),
            self.content
        )
    }
}

pub(crate) fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Lowercase alphanumeric words joined by `-`, or `report` when none remain
pub fn slugify(topic: &str) -> String {
    let mut slug = String::new();
    for word in topic
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let extra = if slug.is_empty() { word.len() } else { word.len() + 1 };
        if slug.len() + extra > MAX_SLUG_CHARS {
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_ascii_lowercase());
    }
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug
    }
}
