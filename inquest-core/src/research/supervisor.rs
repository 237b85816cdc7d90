//! Supervisor: plans sub-topics, dispatches researchers, decides when to stop
//!
//! Each planning pass asks the reasoning capability for the remaining gaps,
//! runs the resulting delegations on the worker pool, and waits for all of
//! them before deciding whether another pass is needed. Passes are capped.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::brief::ResearchBrief;
use super::budget::IterationBudget;
use super::pool::{Delegation, DelegationResult, WorkerPool};
use super::prompts;
use super::writer::Aggregator;
use crate::error::{InquestError, Result};
use crate::llm::{LLMProvider, LLMRequest, Message, ModelOutput};
use crate::tools::{ToolName, ToolOutput, ToolRouter};

const FINDINGS_CHARS: usize = 8_000;

/// Why the supervisor stopped planning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The reasoning capability called `complete`
    Signalled,
    /// Planning-pass cap reached
    PassCapReached,
    /// A pass produced no new delegations
    NoFurtherGaps,
    /// Cancelled by the caller or the run deadline
    Cancelled,
    /// Planning failed; only partial results exist
    Aborted,
}

impl CompletionReason {
    pub fn describe(&self) -> &'static str {
        match self {
            CompletionReason::Signalled => "the supervisor judged the findings sufficient",
            CompletionReason::PassCapReached => "the planning pass limit was reached",
            CompletionReason::NoFurtherGaps => "no further gaps were identified",
            CompletionReason::Cancelled => "research was cancelled before completion",
            CompletionReason::Aborted => "research was aborted after a planning failure",
        }
    }

    /// True when research ended by judgement rather than by a limit
    pub fn is_natural(&self) -> bool {
        matches!(
            self,
            CompletionReason::Signalled | CompletionReason::NoFurtherGaps
        )
    }
}

/// Whether the reasoning capability asked to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSignal {
    Continue,
    Complete,
}

/// Result of one planning step
#[derive(Debug, Clone)]
pub struct Plan {
    /// At most the concurrency cap
    pub delegations: Vec<Delegation>,
    /// Topics beyond the cap
    pub overflow: Vec<String>,
    /// Topics dropped as already covered
    pub overlapping: Vec<String>,
    pub signal: PlanSignal,
}

/// Supervisor limits
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub max_passes: usize,
    pub overlap_threshold: f64,
    pub run_deadline: Option<Duration>,
    pub temperature: Option<f32>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_passes: 4,
            overlap_threshold: 0.8,
            run_deadline: None,
            temperature: None,
        }
    }
}

/// Everything gathered during a supervised run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOutcome {
    pub run_id: Uuid,
    /// Completion order across all passes
    pub results: Vec<DelegationResult>,
    pub completion: CompletionReason,
    pub passes: usize,
    /// Topics that were planned but never run
    pub skipped_topics: Vec<String>,
}

pub struct Supervisor {
    llm: Arc<dyn LLMProvider>,
    router: Arc<ToolRouter>,
    pool: WorkerPool,
    aggregator: Aggregator,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        router: Arc<ToolRouter>,
        pool: WorkerPool,
        aggregator: Aggregator,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            llm,
            router,
            pool,
            aggregator,
            settings,
        }
    }

    /// Ask the reasoning capability for the next delegations.
    ///
    /// # Errors
    ///
    /// Fails if the capability call fails or none of the requested tool calls
    /// are valid.
    pub async fn plan(
        &self,
        brief: &ResearchBrief,
        notes_so_far: &[DelegationResult],
        pass: usize,
    ) -> Result<Plan> {
        let cap = self.router.concurrency_cap();
        // Failed topics stay open for another attempt
        let (failed, covered): (Vec<&DelegationResult>, Vec<&DelegationResult>) =
            notes_so_far.iter().partition(|r| r.is_failed());
        let covered: Vec<String> = covered.iter().map(|r| r.delegation.topic.clone()).collect();
        let failed: Vec<String> = failed.iter().map(|r| r.delegation.topic.clone()).collect();

        let mut findings = String::new();
        for result in notes_so_far {
            if findings.len() >= FINDINGS_CHARS {
                break;
            }
            findings.push_str(&format!("[{}]\n", result.delegation.topic));
            findings.push_str(&result.outcome.notes.summary(FINDINGS_CHARS / cap.max(1)));
        }

        let mut request = LLMRequest::from_messages(vec![
            Message::system(prompts::supervisor_system(cap, pass, self.settings.max_passes)),
            Message::user(prompts::supervisor_user(brief, &covered, &failed, &findings)),
        ])
        .with_tools(&[ToolName::Delegate, ToolName::Complete]);
        if let Some(t) = self.settings.temperature {
            request = request.with_temperature(t);
        }

        let response = self.llm.complete(&request).await?;
        let calls = match response.output {
            // A text reply means nothing is left to research
            ModelOutput::Text(_) => {
                return Ok(Plan {
                    delegations: Vec::new(),
                    overflow: Vec::new(),
                    overlapping: Vec::new(),
                    signal: PlanSignal::Continue,
                });
            }
            ModelOutput::ToolCalls(calls) => calls,
        };

        let mut topics = Vec::new();
        let mut signal = PlanSignal::Continue;
        let mut rejected = Vec::new();
        for call in &calls {
            match self.router.invoke(&call.name, &call.arguments).await {
                Ok(ToolOutput::Delegations { accepted, overflow }) => {
                    topics.extend(accepted);
                    topics.extend(overflow);
                }
                Ok(ToolOutput::Completed { summary }) => {
                    tracing::info!(pass, summary = ?summary, "Supervisor signalled completion");
                    signal = PlanSignal::Complete;
                }
                Ok(other) => rejected.push(format!("{} is not a planning tool", tool_label(&other))),
                Err(e) => rejected.push(e.to_string()),
            }
        }

        if topics.is_empty() && signal == PlanSignal::Continue && !rejected.is_empty() {
            return Err(InquestError::Other(format!(
                "supervisor produced no usable plan: {}",
                rejected.join("; ")
            )));
        }
        for reason in &rejected {
            tracing::warn!(pass, reason = %reason, "Ignored invalid planning call");
        }

        let (mut fresh, overlapping) =
            drop_overlaps(topics, &covered, self.settings.overlap_threshold);
        let overflow = if fresh.len() > cap {
            fresh.split_off(cap)
        } else {
            Vec::new()
        };

        let delegations = fresh
            .into_iter()
            .enumerate()
            .map(|(i, topic)| Delegation::new(format!("p{}-{}", pass, i + 1), topic))
            .collect();

        Ok(Plan {
            delegations,
            overflow,
            overlapping,
            signal,
        })
    }

    /// Run delegations on the worker pool and wait for all of them
    pub async fn dispatch(
        &self,
        delegations: Vec<Delegation>,
        brief: Arc<ResearchBrief>,
        cancel: &CancellationToken,
    ) -> Vec<DelegationResult> {
        self.pool.run(delegations, brief, cancel).await
    }

    /// Terminal decision after a pass, or `None` to plan again
    pub fn decide_complete(
        &self,
        signal: PlanSignal,
        passes: usize,
        last_plan_size: usize,
    ) -> Option<CompletionReason> {
        if signal == PlanSignal::Complete {
            Some(CompletionReason::Signalled)
        } else if last_plan_size == 0 {
            Some(CompletionReason::NoFurtherGaps)
        } else if passes >= self.settings.max_passes {
            Some(CompletionReason::PassCapReached)
        } else {
            None
        }
    }

    /// Supervise research on `brief` until a terminal decision.
    ///
    /// # Errors
    ///
    /// `InputValidation` for an empty brief. `RunFailed` when planning fails,
    /// carrying a partial report if any research had finished.
    pub async fn run(
        &self,
        brief: &ResearchBrief,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<SupervisorOutcome> {
        brief.validate()?;

        let brief = Arc::new(brief.clone());
        let cancel = cancel.child_token();
        let deadline = self.settings.run_deadline.map(|limit| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!(?limit, "Run deadline reached; cancelling researchers");
                token.cancel();
            })
        });

        let mut budget = IterationBudget::new(self.settings.max_passes);
        let mut results: Vec<DelegationResult> = Vec::new();
        let mut skipped_topics = Vec::new();

        let completion = loop {
            if cancel.is_cancelled() {
                break CompletionReason::Cancelled;
            }
            if !budget.try_start() {
                break CompletionReason::PassCapReached;
            }
            let pass = budget.used();

            let plan = match self.plan(&brief, &results, pass).await {
                Ok(plan) => plan,
                Err(e) => {
                    if let Some(handle) = &deadline {
                        handle.abort();
                    }
                    tracing::error!(pass, error = %e, "Planning failed");
                    let partial = SupervisorOutcome {
                        run_id,
                        results,
                        completion: CompletionReason::Aborted,
                        passes: pass,
                        skipped_topics,
                    };
                    return Err(self.abort(&brief, partial, e));
                }
            };

            skipped_topics.extend(plan.overflow.iter().cloned());
            let planned = plan.delegations.len();
            tracing::info!(
                pass,
                delegations = planned,
                overflow = plan.overflow.len(),
                overlapping = plan.overlapping.len(),
                "Planning pass"
            );

            if planned > 0 {
                let batch = self.dispatch(plan.delegations, brief.clone(), &cancel).await;
                results.extend(batch);
            }

            if let Some(reason) = self.decide_complete(plan.signal, pass, planned) {
                break reason;
            }
        };

        if let Some(handle) = &deadline {
            handle.abort();
        }

        let completion = if cancel.is_cancelled() && !completion.is_natural() {
            CompletionReason::Cancelled
        } else {
            completion
        };

        tracing::info!(
            passes = budget.used(),
            delegations = results.len(),
            failed = results.iter().filter(|r| r.is_failed()).count(),
            ?completion,
            "Research finished"
        );

        Ok(SupervisorOutcome {
            run_id,
            results,
            completion,
            passes: budget.used(),
            skipped_topics,
        })
    }

    fn abort(&self, brief: &ResearchBrief, partial: SupervisorOutcome, cause: InquestError) -> InquestError {
        let report = (!partial.results.is_empty())
            .then(|| Box::new(self.aggregator.merge(brief, &partial, Utc::now())));
        InquestError::RunFailed {
            reason: cause.to_string(),
            partial: report,
        }
    }
}

fn tool_label(output: &ToolOutput) -> &'static str {
    match output {
        ToolOutput::SearchResults(_) => "search",
        ToolOutput::Reflection(_) => "reflect",
        ToolOutput::Delegations { .. } => "delegate",
        ToolOutput::Completed { .. } => "complete",
    }
}

fn topic_tokens(topic: &str) -> HashSet<String> {
    topic
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Jaccard similarity of the two topics' lowercase word sets
pub fn topic_overlap(a: &str, b: &str) -> f64 {
    let a = topic_tokens(a);
    let b = topic_tokens(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count() as f64;
    let total = a.union(&b).count() as f64;
    shared / total
}

/// Split `topics` into new ones and ones overlapping `covered` or an earlier
/// topic of the same plan
fn drop_overlaps(topics: Vec<String>, covered: &[String], threshold: f64) -> (Vec<String>, Vec<String>) {
    let mut kept: Vec<String> = Vec::new();
    let mut dropped = Vec::new();
    for topic in topics {
        let overlaps = covered
            .iter()
            .chain(kept.iter())
            .any(|seen| topic_overlap(&topic, seen) >= threshold);
        if overlaps {
            dropped.push(topic);
        } else {
            kept.push(topic);
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CallPolicy, LLMResponse, RequestedToolCall, RetryConfig, ScriptedProvider};
    use crate::research::researcher::{Researcher, ResearcherSettings, Termination};
    use crate::search::{ScriptedSearch, SearchHit};
    use crate::tools::ToolError;
    use serde_json::json;

    fn supervisor(llm: Arc<ScriptedProvider>, settings: SupervisorSettings) -> Supervisor {
        let search = Arc::new(ScriptedSearch::new(|q| {
            Ok(vec![SearchHit::new(
                format!("https://{}.test", q.replace(' ', "-")),
                q,
                "Some content.",
            )])
        }));
        supervisor_with(llm, search, settings)
    }

    fn supervisor_with(
        llm: Arc<ScriptedProvider>,
        search: Arc<ScriptedSearch>,
        settings: SupervisorSettings,
    ) -> Supervisor {
        let policy = CallPolicy::new(Duration::from_secs(1), RetryConfig::no_retry());
        let router = Arc::new(ToolRouter::new(search, policy, 3));
        let researcher = Arc::new(Researcher::new(
            llm.clone(),
            router.clone(),
            ResearcherSettings::default(),
        ));
        let pool = WorkerPool::new(router.clone(), researcher);
        Supervisor::new(llm, router, pool, Aggregator::default(), settings)
    }

    /// Supervisor requests offer `delegate`; researcher requests offer `reflect`
    fn scripted<F>(plan: F) -> Arc<ScriptedProvider>
    where
        F: Fn(usize) -> LLMResponse + Send + Sync + 'static,
    {
        let passes = std::sync::atomic::AtomicUsize::new(0);
        Arc::new(ScriptedProvider::new(move |request| {
            if request.offers(ToolName::Delegate) {
                let pass = passes.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                Ok(plan(pass))
            } else {
                Ok(LLMResponse::tool_call(
                    "reflect",
                    json!({"reflection": "ok", "decision": "stop"}),
                ))
            }
        }))
    }

    fn brief() -> ResearchBrief {
        ResearchBrief::new("Grid-scale battery storage").unwrap()
    }

    #[test]
    fn test_topic_overlap() {
        assert_eq!(topic_overlap("Sodium ion batteries", "sodium-ion batteries"), 1.0);
        assert!(topic_overlap("sodium ion batteries", "lithium supply chains") < 0.2);
    }

    #[test]
    fn test_drop_overlaps_within_plan_and_history() {
        let (kept, dropped) = drop_overlaps(
            vec![
                "flow batteries".into(),
                "Flow Batteries".into(),
                "pumped hydro".into(),
                "compressed air storage".into(),
            ],
            &["Pumped hydro".to_string()],
            0.8,
        );
        assert_eq!(kept, vec!["flow batteries", "compressed air storage"]);
        assert_eq!(dropped.len(), 2);
    }

    #[test]
    fn test_decide_complete() {
        let sup = supervisor(scripted(|_| LLMResponse::text_response("")), SupervisorSettings::default());
        assert_eq!(
            sup.decide_complete(PlanSignal::Complete, 1, 3),
            Some(CompletionReason::Signalled)
        );
        assert_eq!(
            sup.decide_complete(PlanSignal::Continue, 1, 0),
            Some(CompletionReason::NoFurtherGaps)
        );
        assert_eq!(
            sup.decide_complete(PlanSignal::Continue, 4, 2),
            Some(CompletionReason::PassCapReached)
        );
        assert_eq!(sup.decide_complete(PlanSignal::Continue, 2, 2), None);
    }

    #[tokio::test]
    async fn test_plan_caps_delegations_and_reports_overflow() {
        let sup = supervisor(
            scripted(|_| {
                LLMResponse::tool_call(
                    "delegate",
                    json!({"topics": ["flow batteries", "pumped hydro", "thermal storage", "hydrogen", "flywheels"]}),
                )
            }),
            SupervisorSettings::default(),
        );

        let plan = sup.plan(&brief(), &[], 1).await.unwrap();
        assert_eq!(plan.delegations.len(), 3);
        assert_eq!(plan.overflow, vec!["hydrogen", "flywheels"]);
        assert_eq!(plan.delegations[0].id, "p1-1");
        assert_eq!(plan.signal, PlanSignal::Continue);
    }

    #[tokio::test]
    async fn test_run_stops_when_signalled() {
        let sup = supervisor(
            scripted(|pass| match pass {
                1 => LLMResponse::tool_call("delegate", json!({"topics": ["flow batteries", "pumped hydro"]})),
                _ => LLMResponse::tool_call("complete", json!({"summary": "covered"})),
            }),
            SupervisorSettings::default(),
        );

        let outcome = sup.run(&brief(), Uuid::new_v4(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.completion, CompletionReason::Signalled);
        assert_eq!(outcome.passes, 2);
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn test_run_respects_pass_cap() {
        let sup = supervisor(
            scripted(|pass| {
                LLMResponse::tool_call("delegate", json!({"topics": [format!("angle number {}", pass)]}))
            }),
            SupervisorSettings {
                max_passes: 2,
                ..Default::default()
            },
        );

        let outcome = sup.run(&brief(), Uuid::new_v4(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.completion, CompletionReason::PassCapReached);
        assert_eq!(outcome.passes, 2);
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_topics_end_the_run() {
        let sup = supervisor(
            scripted(|_| LLMResponse::tool_call("delegate", json!({"topics": ["flow batteries"]}))),
            SupervisorSettings::default(),
        );

        let outcome = sup.run(&brief(), Uuid::new_v4(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.completion, CompletionReason::NoFurtherGaps);
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_topic_can_be_delegated_again() {
        let searches = std::sync::atomic::AtomicUsize::new(0);
        let search = Arc::new(ScriptedSearch::new(move |q| {
            if searches.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(ToolError::internal("index corrupted").into());
            }
            Ok(vec![SearchHit::new("https://flow.test", q, "Vanadium flow cells.")])
        }));
        let llm = scripted(|pass| match pass {
            1 | 2 => LLMResponse::tool_call("delegate", json!({"topics": ["flow batteries"]})),
            _ => LLMResponse::tool_call("complete", json!({})),
        });
        let sup = supervisor_with(llm.clone(), search, SupervisorSettings::default());

        let outcome = sup.run(&brief(), Uuid::new_v4(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.completion, CompletionReason::Signalled);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].is_failed());
        assert!(!outcome.results[1].is_failed());

        // the second plan is told the topic failed, not that it is covered
        let plans: Vec<_> = llm
            .call_history()
            .await
            .into_iter()
            .filter(|r| r.offers(ToolName::Delegate))
            .collect();
        let second = &plans[1].messages[1].content;
        assert!(second.contains("Topics that failed"));
        assert!(!second.contains("Topics already researched"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_researchers_in_flight() {
        let counter = std::sync::atomic::AtomicUsize::new(0);
        let search = Arc::new(
            ScriptedSearch::new(move |q| {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(vec![SearchHit::new(format!("https://slow.test/{}", n), q, "Slow source.")])
            })
            .with_delay(Duration::from_millis(400)),
        );
        // researchers never choose to stop on their own
        let llm = Arc::new(ScriptedProvider::new(|request| {
            Ok(if request.offers(ToolName::Delegate) {
                LLMResponse::tool_call("delegate", json!({"topics": ["flow batteries", "pumped hydro"]}))
            } else {
                LLMResponse::tool_call("reflect", json!({"reflection": "more", "decision": "continue"}))
            })
        }));
        let sup = supervisor_with(
            llm,
            search.clone(),
            SupervisorSettings {
                run_deadline: Some(Duration::from_millis(1_000)),
                ..Default::default()
            },
        );

        let caller = CancellationToken::new();
        let outcome = sup.run(&brief(), Uuid::new_v4(), &caller).await.unwrap();

        assert_eq!(outcome.completion, CompletionReason::Cancelled);
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.results.len(), 2);
        for result in &outcome.results {
            // the search in flight at the deadline still completes
            assert_eq!(result.outcome.termination, Termination::Cancelled);
            assert_eq!(result.outcome.iterations, 3);
            assert!(!result.is_failed());
        }
        assert_eq!(search.call_count(), 6);
        assert!(!caller.is_cancelled());

        let report = Aggregator::default().merge(&brief(), &outcome, Utc::now());
        assert_eq!(report.citations.len(), 6);
        assert!(!report.is_complete());
        assert!(report.content.contains("Research stopped early"));
        assert!(report.content.contains("was cut short"));
    }

    #[tokio::test]
    async fn test_planning_failure_returns_partial_report() {
        let sup = supervisor(
            scripted(|pass| match pass {
                1 => LLMResponse::tool_calls(vec![RequestedToolCall::new(
                    "c1",
                    "delegate",
                    json!({"topics": ["flow batteries"]}),
                )]),
                _ => LLMResponse::tool_call("browse", json!({})),
            }),
            SupervisorSettings::default(),
        );

        let err = sup
            .run(&brief(), Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap_err();
        let partial = err.partial_report().expect("partial report");
        assert_eq!(partial.citations.len(), 1);
    }

    #[tokio::test]
    async fn test_first_pass_failure_has_no_partial() {
        let llm = Arc::new(ScriptedProvider::new(|_| Err(InquestError::Other("down".into()))));
        let sup = supervisor(llm, SupervisorSettings::default());

        let err = sup
            .run(&brief(), Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InquestError::RunFailed { partial: None, .. }));
    }

    #[tokio::test]
    async fn test_empty_brief_rejected() {
        let sup = supervisor(scripted(|_| LLMResponse::text_response("")), SupervisorSettings::default());
        let empty = ResearchBrief {
            goal: " ".into(),
            scope: None,
            timeframe: None,
            entities: Vec::new(),
        };
        let err = sup
            .run(&empty, Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InquestError::InputValidation(_)));
    }
}
