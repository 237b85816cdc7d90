//! Optional rewrite of a merged report by the reasoning capability
//!
//! The deterministic merge stays the source of truth: the rewritten body may
//! only cite sources the merge numbered, and the merge's completeness and
//! sources sections are appended unchanged. Any problem with the rewrite
//! leaves the merged report in place.

use regex::Regex;
use std::sync::{Arc, LazyLock};

use super::brief::ResearchBrief;
use super::prompts;
use super::report::{Report, estimate_tokens};
use super::writer::render_appendix;
use crate::error::{InquestError, Result};
use crate::llm::{LLMProvider, LLMRequest, Message};

static CITATION_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

pub struct ReportSynthesizer {
    llm: Arc<dyn LLMProvider>,
    token_budget: usize,
    temperature: Option<f32>,
}

impl ReportSynthesizer {
    pub fn new(llm: Arc<dyn LLMProvider>, token_budget: usize) -> Self {
        Self {
            llm,
            token_budget,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Rewritten report, or `merged` itself when there is nothing to cite or
    /// the rewrite is unusable
    pub async fn rewrite(&self, brief: &ResearchBrief, merged: Report) -> Report {
        if merged.citations.is_empty() {
            return merged;
        }
        match self.synthesize(brief, &merged).await {
            Ok(report) => {
                tracing::info!(tokens = report.estimate_tokens(), "Report synthesized");
                report
            }
            Err(e) => {
                tracing::warn!(error = %e, "Report synthesis failed; keeping the merged report");
                merged
            }
        }
    }

    /// # Errors
    ///
    /// Fails when the call fails, the reply is empty, it cites a source the
    /// merge did not number, or the result exceeds the token budget.
    pub async fn synthesize(&self, brief: &ResearchBrief, merged: &Report) -> Result<Report> {
        let mut request = LLMRequest::from_messages(vec![
            Message::system(prompts::synthesis_system(merged.citations.len(), self.token_budget)),
            Message::user(prompts::synthesis_user(brief, &merged.content)),
        ])
        .with_max_tokens(self.token_budget);
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }

        let response = self.llm.complete(&request).await?;
        let text = response
            .text()
            .ok_or_else(|| InquestError::Other("synthesis returned tool calls".to_string()))?;
        let body = clean_body(text);
        if body.is_empty() {
            return Err(InquestError::Other("synthesis returned an empty report".to_string()));
        }

        let mut cited = 0;
        for marker in CITATION_MARKER.captures_iter(body) {
            let ordinal: usize = marker[1].parse().unwrap_or(0);
            if ordinal == 0 || ordinal > merged.citations.len() {
                return Err(InquestError::Other(format!(
                    "synthesis cited unknown source [{}]",
                    &marker[1]
                )));
            }
            cited += 1;
        }
        if cited == 0 {
            return Err(InquestError::Other("synthesis cited no sources".to_string()));
        }

        let content = format!(
            "# {}\n\n{}\n{}",
            merged.metadata.topic,
            body,
            render_appendix(&merged.metadata.completeness, &merged.citations)
        );
        let tokens = estimate_tokens(&content);
        if tokens > self.token_budget {
            return Err(InquestError::Other(format!(
                "synthesized report needs {} tokens, budget is {}",
                tokens, self.token_budget
            )));
        }

        let mut metadata = merged.metadata.clone();
        metadata.synthesized = true;
        Ok(Report {
            content,
            citations: merged.citations.clone(),
            metadata,
        })
    }
}

/// Drop a leading title and any closing sections the model wrote itself
fn clean_body(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with("# ") {
        body = body.split_once('\n').map_or("", |(_, rest)| rest).trim_start();
    }
    let end = ["## Completeness", "## Sources"]
        .iter()
        .filter_map(|heading| body.find(heading))
        .min()
        .unwrap_or(body.len());
    body[..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMResponse, ScriptedProvider};
    use crate::research::notes::Citation;
    use crate::research::report::{Completeness, ReportMetadata};
    use crate::research::supervisor::CompletionReason;
    use chrono::Utc;
    use uuid::Uuid;

    fn merged() -> Report {
        let citations = vec![
            Citation {
                ordinal: 1,
                url: "https://a.test".into(),
                title: "A".into(),
            },
            Citation {
                ordinal: 2,
                url: "https://b.test".into(),
                title: "B".into(),
            },
        ];
        let completeness = Completeness::new(CompletionReason::Signalled);
        Report {
            content: format!(
                "# Heat pumps\n\n## Findings\n\n### policy\n\n- Subsidies grew [1]\n- Sales rose [2]\n{}",
                render_appendix(&completeness, &citations)
            ),
            citations,
            metadata: ReportMetadata {
                topic: "Heat pumps".into(),
                generated_at: Utc::now(),
                run_id: Uuid::nil(),
                completeness,
                synthesized: false,
            },
        }
    }

    fn brief() -> ResearchBrief {
        ResearchBrief::new("Heat pump adoption in Europe").unwrap()
    }

    fn synthesizer(reply: &str, budget: usize) -> ReportSynthesizer {
        let llm = Arc::new(ScriptedProvider::with_responses(vec![LLMResponse::text_response(reply)]));
        ReportSynthesizer::new(llm, budget)
    }

    #[tokio::test]
    async fn test_rewrite_keeps_merged_citations_and_appendix() {
        let reply = "# Heat pumps\n\n## Overview\n\nSubsidies drove sales [1][2].\n\n## Sources\n[1] made up";
        let report = synthesizer(reply, 32_000).rewrite(&brief(), merged()).await;

        assert!(report.metadata.synthesized);
        assert!(report.content.starts_with("# Heat pumps\n\n## Overview"));
        assert!(report.content.contains("Subsidies drove sales [1][2]."));
        assert!(!report.content.contains("made up"));
        assert!(report.content.contains("[2] B: https://b.test"));
        assert_eq!(report.content.matches("## Sources").count(), 1);
        assert_eq!(report.citations, merged().citations);
    }

    #[tokio::test]
    async fn test_unknown_citation_keeps_merged_report() {
        let base = merged();
        let report = synthesizer("Claim [3].", 32_000).rewrite(&brief(), base.clone()).await;
        assert_eq!(report, base);
    }

    #[tokio::test]
    async fn test_uncited_or_oversized_rewrite_keeps_merged_report() {
        let base = merged();
        let report = synthesizer("No sources here.", 32_000).rewrite(&brief(), base.clone()).await;
        assert_eq!(report, base);

        let long = format!("{} [1]", "word ".repeat(1_000));
        let report = synthesizer(&long, 200).rewrite(&brief(), base.clone()).await;
        assert_eq!(report, base);
    }

    #[tokio::test]
    async fn test_failed_call_keeps_merged_report() {
        let llm = Arc::new(ScriptedProvider::new(|_| Err(InquestError::Other("down".into()))));
        let base = merged();
        let report = ReportSynthesizer::new(llm, 32_000).rewrite(&brief(), base.clone()).await;
        assert_eq!(report, base);
    }

    #[tokio::test]
    async fn test_nothing_to_cite_skips_the_call() {
        let llm = Arc::new(ScriptedProvider::with_responses(Vec::new()));
        let mut base = merged();
        base.citations.clear();
        let report = ReportSynthesizer::new(llm.clone(), 32_000).rewrite(&brief(), base.clone()).await;
        assert_eq!(report, base);
        assert_eq!(llm.call_count(), 0);
    }
}
