//! Findings gathered by researchers
//!
//! A [`NoteSet`] belongs to one researcher for the length of its run and is
//! handed to the supervisor by value once the researcher finishes.

use serde::{Deserialize, Serialize};
use url::{Url, form_urlencoded};

use crate::search::SearchHit;

/// Kind of note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// Sourced content that may appear in the report
    Finding,
    /// Reflection text; never surfaced in the report
    Internal,
}

/// Where a finding came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
}

/// A single note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub kind: NoteKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl Note {
    pub fn finding(content: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: NoteKind::Finding,
            content: content.into(),
            source: Some(Source {
                url: url.into(),
                title: title.into(),
            }),
        }
    }

    pub fn internal(content: impl Into<String>) -> Self {
        Self {
            kind: NoteKind::Internal,
            content: content.into(),
            source: None,
        }
    }

    pub fn is_finding(&self) -> bool {
        self.kind == NoteKind::Finding
    }
}

/// Ordered notes of one researcher, deduplicated by normalized source url
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteSet {
    notes: Vec<Note>,
}

impl NoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a search hit as a finding, truncating its content to `max_chars`.
    ///
    /// Returns false when the hit's url was already recorded.
    pub fn push_hit(&mut self, hit: &SearchHit, max_chars: usize) -> bool {
        self.push_finding(hit, truncate_content(hit.content.trim(), max_chars))
    }

    /// Add a search hit as a finding with already condensed `content`.
    ///
    /// Returns false when the hit's url was already recorded.
    pub fn push_finding(&mut self, hit: &SearchHit, content: String) -> bool {
        if self.contains_url(&hit.url) {
            return false;
        }
        let title = if hit.title.trim().is_empty() {
            hit.url.clone()
        } else {
            hit.title.trim().to_string()
        };
        self.notes.push(Note::finding(content, hit.url.trim(), title));
        true
    }

    /// True when a finding from the same normalized url is already recorded
    pub fn contains_url(&self, url: &str) -> bool {
        let key = normalize_url(url);
        self.findings()
            .filter_map(|n| n.source.as_ref())
            .any(|s| normalize_url(&s.url) == key)
    }

    pub fn push_internal(&mut self, content: impl Into<String>) {
        self.notes.push(Note::internal(content));
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn findings(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.is_finding())
    }

    pub fn finding_count(&self) -> usize {
        self.findings().count()
    }

    /// True when no findings were gathered (internal notes do not count)
    pub fn is_empty(&self) -> bool {
        self.finding_count() == 0
    }

    /// Compact rendering of the findings for a reasoning prompt
    pub fn summary(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for (i, note) in self.findings().enumerate() {
            let title = note.source.as_ref().map(|s| s.title.as_str()).unwrap_or("");
            let line = format!("{}. {}: {}\n", i + 1, title, first_sentence(&note.content));
            if out.len() + line.len() > max_chars {
                out.push_str("...\n");
                break;
            }
            out.push_str(&line);
        }
        out
    }
}

fn first_sentence(text: &str) -> &str {
    let end = text
        .find(". ")
        .map(|i| i + 1)
        .unwrap_or(text.len())
        .min(280);
    let mut end = end;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// A cited source with its report ordinal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based, in first-seen order
    pub ordinal: usize,
    pub url: String,
    pub title: String,
}

/// Canonical form of a url, used to decide whether two citations are the same.
///
/// Hosts are lowercased and punycoded, `www.` and default ports are dropped,
/// `http` folds into `https`, and fragments, `utm_*` parameters and a trailing
/// slash are removed. Anything that does not parse is only trimmed.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let parsed = if url.contains("://") {
        Url::parse(url)
    } else {
        Url::parse(&format!("https://{}", url))
    };
    let Ok(parsed) = parsed else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return url.to_string();
    };

    let scheme = match parsed.scheme() {
        "http" => "https",
        other => other,
    };
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut out = format!("{}://{}", scheme, host);
    if let Some(port) = parsed.port().filter(|p| !matches!(p, 80 | 443)) {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(parsed.path().trim_end_matches('/'));

    let params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !key.to_ascii_lowercase().starts_with("utm_"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if !params.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    out
}

/// Cut `content` to at most `max_chars` characters.
///
/// Prefers ending on a sentence boundary when that keeps at least 80% of the
/// budget; otherwise cuts hard and appends an ellipsis.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }

    let cut = content
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(content.len());
    let head = &content[..cut];

    let boundary = [". ", "! ", "? "]
        .iter()
        .filter_map(|sep| head.rfind(sep).map(|i| i + 1))
        .max();

    if let Some(end) = boundary {
        if head[..end].chars().count() * 5 >= max_chars * 4 {
            return head[..end].to_string();
        }
    }

    let mut out = head.trim_end().to_string();
    out.push_str("...");
    out
}
