//! End-to-end research sessions against scripted capabilities
//!
//! Each test wires a full [`ResearchSession`] with a scripted reasoning
//! provider that answers by role (clarifier, brief writer, supervisor,
//! researcher), a scripted search provider, and in-memory storage.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use inquest_core::prelude::*;
use inquest_core::research::normalize_url;

/// Answers clarifying questions from a fixed list; `None` means no answer
struct ScriptedPrompt {
    answers: Vec<Option<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    fn new(answers: Vec<Option<&str>>) -> Self {
        Self {
            answers: answers.into_iter().map(|a| a.map(str::to_string)).collect(),
            asked: Mutex::new(Vec::new()),
        }
    }

    async fn questions(&self) -> Vec<String> {
        self.asked.lock().await.clone()
    }
}

#[async_trait]
impl UserPrompt for ScriptedPrompt {
    async fn ask(&self, question: &str) -> Option<String> {
        let mut asked = self.asked.lock().await;
        asked.push(question.to_string());
        self.answers.get(asked.len() - 1).cloned().flatten()
    }
}

/// How the scripted supervisor and researchers behave
#[derive(Clone)]
struct Script {
    /// Clarifying questions asked while no answer is in the transcript
    clarify_until_answered: bool,
    /// Topics delegated on the first pass; later passes call `complete`
    topics: Vec<&'static str>,
    /// Searches each researcher runs before stopping
    searches_per_topic: usize,
}

fn system_prompt(request: &LLMRequest) -> &str {
    request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

fn line_value<'a>(request: &'a LLMRequest, prefix: &str) -> &'a str {
    request
        .messages
        .iter()
        .flat_map(|m| m.content.lines())
        .find_map(|line| line.strip_prefix(prefix))
        .unwrap_or("")
}

fn scripted_llm(script: Script) -> Arc<ScriptedProvider> {
    let planned = AtomicUsize::new(0);
    Arc::new(ScriptedProvider::new(move |request| {
        if request.offers(ToolName::Delegate) {
            let pass = planned.fetch_add(1, Ordering::SeqCst);
            return Ok(if pass == 0 {
                LLMResponse::tool_call("delegate", json!({ "topics": script.topics }))
            } else {
                LLMResponse::tool_call("complete", json!({ "summary": "covered" }))
            });
        }

        if request.offers(ToolName::Reflect) {
            let query = line_value(request, "Last query: ");
            let round = query.matches(" more").count() + 1;
            return Ok(if round >= script.searches_per_topic {
                LLMResponse::tool_call("reflect", json!({"reflection": "enough", "decision": "stop"}))
            } else {
                LLMResponse::tool_call(
                    "reflect",
                    json!({
                        "reflection": "INTERNAL: need more detail",
                        "decision": "continue",
                        "next_query": format!("{} more", query),
                    }),
                )
            });
        }

        if system_prompt(request).contains("research brief") {
            return Ok(LLMResponse::text_response(
                json!({
                    "research_brief": "Recent advances in quantum computing hardware",
                    "scope": "superconducting and trapped-ion platforms",
                    "timeframe": "2023-2025",
                    "entities": ["IBM", "IonQ"],
                })
                .to_string(),
            ));
        }

        // Clarification decision
        let answered = request.messages.iter().filter(|m| m.role == MessageRole::User).count() > 1;
        let ask = script.clarify_until_answered && !answered;
        Ok(LLMResponse::text_response(
            json!({
                "need_clarification": ask,
                "question": if ask { "Which hardware platforms matter most?" } else { "" },
                "verification": "Starting research.",
            })
            .to_string(),
        ))
    }))
}

/// Two hits per query; the `shared` source shows up for every topic
fn scripted_search() -> Arc<ScriptedSearch> {
    Arc::new(ScriptedSearch::new(|query| {
        let slug = query.replace(' ', "-");
        Ok(vec![
            SearchHit::new(format!("https://example.org/{}", slug), query, format!("About {}.", query)),
            SearchHit::new(
                "https://www.Shared.org/overview/?utm_source=feed",
                "Shared overview",
                "An overview of the field.",
            ),
        ])
    }))
}

fn test_config() -> InquestConfig {
    let mut config = InquestConfig::default();
    config.capabilities.initial_backoff = Duration::from_millis(1);
    config.capabilities.max_backoff = Duration::from_millis(2);
    config.capabilities.call_timeout = Duration::from_secs(5);
    config
}

fn session(
    config: InquestConfig,
    llm: Arc<ScriptedProvider>,
    search: Arc<dyn SearchProvider>,
    local: Arc<InMemoryStorage>,
) -> ResearchSession {
    ResearchSession::builder(Arc::new(config))
        .llm(llm)
        .search(search)
        .local_storage(local)
        .build()
        .expect("session builds")
}

#[tokio::test]
async fn scenario_a_clarified_run_merges_unique_citations() {
    let llm = scripted_llm(Script {
        clarify_until_answered: true,
        topics: vec!["superconducting qubits", "trapped ions"],
        searches_per_topic: 2,
    });
    let storage = Arc::new(InMemoryStorage::new());
    let session = session(test_config(), llm, scripted_search(), storage.clone());
    let prompt = ScriptedPrompt::new(vec![Some("Superconducting and trapped-ion hardware")]);

    let outcome = session
        .run("quantum computing hardware advances", &prompt)
        .await
        .unwrap();

    assert_eq!(prompt.questions().await.len(), 1);
    assert_eq!(outcome.brief.goal, "Recent advances in quantum computing hardware");

    // 2 topics x 2 queries, plus the shared source once
    let report = &outcome.report;
    assert_eq!(report.citations.len(), 5);
    let normalized: HashSet<_> = report.citations.iter().map(|c| normalize_url(&c.url)).collect();
    assert_eq!(normalized.len(), report.citations.len());
    assert_eq!(
        report.citations.iter().map(|c| c.ordinal).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );

    // Ordinals follow first appearance in the document body
    let body = report.content.split("## Sources").next().unwrap();
    let mut positions = Vec::new();
    for c in &report.citations {
        positions.push(body.find(&format!("[{}]", c.ordinal)).unwrap());
    }
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    assert!(!report.content.contains("INTERNAL"));
    assert!(report.is_complete());
    assert_eq!(storage.paths().await, vec![report.storage_path()]);
}

#[tokio::test]
async fn scenario_b_failing_search_yields_insufficient_data() {
    let llm = scripted_llm(Script {
        clarify_until_answered: false,
        topics: vec!["superconducting qubits", "trapped ions"],
        searches_per_topic: 1,
    });
    let search = Arc::new(ScriptedSearch::new(|_| {
        Err(ToolError::transient("search backend unavailable").into())
    }));
    let session = session(test_config(), llm, search.clone(), Arc::new(InMemoryStorage::new()));

    let brief = ResearchBrief::new("Recent advances in quantum computing hardware").unwrap();
    let outcome = session.research(&brief).await.unwrap();

    assert_eq!(outcome.results.len(), 2);
    for result in &outcome.results {
        assert_eq!(result.outcome.iterations, 5);
        assert_eq!(result.outcome.termination, Termination::BudgetExhausted);
        assert_eq!(result.outcome.notes.finding_count(), 0);
        assert!(result.is_failed());
    }
    // 2 researchers x 5 iterations x 3 attempts
    assert_eq!(search.call_count(), 30);

    let report = session.merge(&brief, &outcome);
    assert!(report.citations.is_empty());
    assert!(report.metadata.completeness.insufficient_data);
    assert!(report.content.contains("Insufficient data"));
    assert!(!report.is_complete());
}

#[tokio::test]
async fn scenario_c_unanswered_questions_force_the_brief() {
    let llm = scripted_llm(Script {
        clarify_until_answered: true,
        topics: vec!["superconducting qubits"],
        searches_per_topic: 1,
    });
    let session = session(
        test_config(),
        llm.clone(),
        scripted_search(),
        Arc::new(InMemoryStorage::new()),
    );
    let prompt = ScriptedPrompt::new(vec![None, None, None, None]);

    let mut request = ResearchRequest::new("quantum computing hardware advances").unwrap();
    let brief = session.scope(&mut request, &prompt).await.unwrap();

    assert_eq!(prompt.questions().await.len(), 3);
    assert!(request.is_sealed());
    assert!(!brief.goal.is_empty());

    // 3 decisions plus the brief; no 4th decision is requested
    assert_eq!(llm.call_count(), 4);
}

#[tokio::test]
async fn scenario_d_storage_failure_keeps_the_report() {
    let llm = scripted_llm(Script {
        clarify_until_answered: false,
        topics: vec!["superconducting qubits"],
        searches_per_topic: 1,
    });
    let local = Arc::new(InMemoryStorage::new());
    let remote = Arc::new(InMemoryStorage::failing(StorageError::Rejected {
        path: "reports/x.md".into(),
        status: 403,
        message: "forbidden".into(),
    }));
    let session = ResearchSession::builder(Arc::new(test_config()))
        .llm(llm)
        .search(scripted_search())
        .local_storage(local.clone())
        .remote_storage(remote.clone())
        .build()
        .unwrap();

    let outcome = session.run("quantum computing hardware", &NoPrompt).await.unwrap();

    assert!(!outcome.report.citations.is_empty());
    assert_eq!(outcome.warnings().len(), 1);
    assert!(matches!(outcome.warnings()[0], StorageError::Rejected { status: 403, .. }));
    assert!(outcome.publish.local_uri.is_some());
    assert!(outcome.publish.remote_uri.is_none());
    // Rejections are not retried
    assert_eq!(remote.attempts(), 1);
}

#[tokio::test]
async fn researchers_stop_at_the_iteration_cap() {
    let llm = scripted_llm(Script {
        clarify_until_answered: false,
        topics: vec!["superconducting qubits"],
        searches_per_topic: usize::MAX,
    });
    let session = session(test_config(), llm, scripted_search(), Arc::new(InMemoryStorage::new()));

    let brief = ResearchBrief::new("Quantum hardware").unwrap();
    let outcome = session.research(&brief).await.unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.outcome.iterations, 5);
    assert_eq!(result.outcome.termination, Termination::BudgetExhausted);

    let report = session.merge(&brief, &outcome);
    assert!(report.content.contains("was cut short"));
}

/// Search that records peak concurrency and fails for one topic
struct GaugedSearch {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl SearchProvider for GaugedSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if query.contains("broken") {
            return Err(ToolError::transient("upstream error").into());
        }
        Ok(vec![SearchHit::new(
            format!("https://example.org/{}", query.replace(' ', "-")),
            query,
            format!("About {}.", query),
        )])
    }
}

#[tokio::test]
async fn concurrency_is_capped_and_failures_are_isolated() {
    let llm = scripted_llm(Script {
        clarify_until_answered: false,
        topics: vec!["broken topic", "photonic chips", "neutral atoms", "spin qubits", "anyons"],
        searches_per_topic: 1,
    });
    let search = Arc::new(GaugedSearch {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let session = session(test_config(), llm, search.clone(), Arc::new(InMemoryStorage::new()));

    let outcome = session.run("quantum hardware", &NoPrompt).await.unwrap();
    let report = &outcome.report;

    assert!(search.peak.load(Ordering::SeqCst) <= 3);

    let completeness = &report.metadata.completeness;
    assert_eq!(completeness.failed.len(), 1);
    assert_eq!(completeness.failed[0].topic, "broken topic");
    assert_eq!(completeness.skipped_topics, vec!["spin qubits", "anyons"]);

    assert_eq!(report.citations.len(), 2);
    assert!(report.content.contains("### photonic chips"));
    assert!(report.content.contains("### neutral atoms"));
    assert!(report.content.contains("Sub-task \"broken topic\" failed"));
    assert!(report.content.contains("Topics not researched: spin qubits, anyons."));
}

#[tokio::test]
async fn merging_twice_gives_the_same_report() {
    let llm = scripted_llm(Script {
        clarify_until_answered: false,
        topics: vec!["superconducting qubits", "trapped ions"],
        searches_per_topic: 2,
    });
    let session = session(test_config(), llm, scripted_search(), Arc::new(InMemoryStorage::new()));

    let brief = ResearchBrief::new("Quantum hardware").unwrap();
    let outcome = session.research(&brief).await.unwrap();

    let at = Utc::now();
    let aggregator = Aggregator::default();
    let first = aggregator.merge(&brief, &outcome, at);
    let second = aggregator.merge(&brief, &outcome, at);
    assert_eq!(first.content, second.content);
    assert_eq!(first.citations, second.citations);
}

#[tokio::test]
async fn cancelled_run_reports_cancellation() {
    let llm = scripted_llm(Script {
        clarify_until_answered: false,
        topics: vec!["superconducting qubits"],
        searches_per_topic: 3,
    });
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let session = ResearchSession::builder(Arc::new(test_config()))
        .llm(llm)
        .search(scripted_search())
        .local_storage(Arc::new(InMemoryStorage::new()))
        .cancellation(cancel)
        .build()
        .unwrap();

    let brief = ResearchBrief::new("Quantum hardware").unwrap();
    let outcome = session.research(&brief).await.unwrap();
    assert_eq!(outcome.completion, CompletionReason::Cancelled);
    assert!(outcome.results.is_empty());
}
