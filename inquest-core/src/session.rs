//! One research run, end to end: clarify, supervise, merge, publish

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::InquestConfig;
use crate::error::Result;
use crate::llm::{GuardedProvider, LLMProvider, LLMProviderFactory};
use crate::research::{
    Aggregator, ClarificationGate, ClarificationOutcome, ClarificationState, PublishOutcome, Report,
    ReportSynthesizer, ReportWriter, ResearchBrief, ResearchRequest, Researcher, ResearcherSettings,
    SourceSummarizer, Supervisor, SupervisorOutcome, SupervisorSettings, WorkerPool,
};
use crate::search::{self, SearchProvider};
use crate::storage::{HttpStorage, LocalStorage, StorageBackend, StorageError};
use crate::tools::ToolRouter;

/// Source of answers to clarifying questions
#[async_trait]
pub trait UserPrompt: Send + Sync {
    /// `None` when the user gives no answer
    async fn ask(&self, question: &str) -> Option<String>;
}

/// Never answers; the gate writes the brief from the request alone
pub struct NoPrompt;

#[async_trait]
impl UserPrompt for NoPrompt {
    async fn ask(&self, _question: &str) -> Option<String> {
        None
    }
}

/// Result of a completed session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub brief: ResearchBrief,
    pub report: Report,
    pub publish: PublishOutcome,
}

impl SessionOutcome {
    /// Storage failures; the report is valid regardless
    pub fn warnings(&self) -> &[StorageError] {
        &self.publish.warnings
    }
}

/// Wires the gate, supervisor, aggregator, and writer for a single run
pub struct ResearchSession {
    config: Arc<InquestConfig>,
    gate: ClarificationGate,
    supervisor: Supervisor,
    aggregator: Aggregator,
    synthesizer: Option<ReportSynthesizer>,
    writer: ReportWriter,
    cancel: CancellationToken,
}

impl ResearchSession {
    pub fn builder(config: Arc<InquestConfig>) -> ResearchSessionBuilder {
        ResearchSessionBuilder::new(config)
    }

    pub fn config(&self) -> &InquestConfig {
        &self.config
    }

    /// Token that stops research at the next iteration boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the clarification gate to a brief, asking `prompt` in between.
    /// Seals `request` once the brief is ready.
    pub async fn scope(
        &self,
        request: &mut ResearchRequest,
        prompt: &dyn UserPrompt,
    ) -> Result<ResearchBrief> {
        let mut state = ClarificationState::new(self.config.research.max_clarification_rounds);
        loop {
            match self.gate.evaluate(&mut state, request).await? {
                ClarificationOutcome::Question(question) => {
                    request.record_question(question.clone())?;
                    let answer = prompt.ask(&question).await;
                    let text = answer.as_deref().map(str::trim).unwrap_or_default();
                    if text.is_empty() {
                        tracing::info!(round = state.round(), "Clarifying question left unanswered");
                    }
                    request.add_answer(text)?;
                    state.record_answer(answer);
                }
                ClarificationOutcome::Brief(brief) => {
                    request.seal();
                    tracing::info!(
                        rounds = state.round(),
                        topic = brief.topic(),
                        "Research brief ready"
                    );
                    return Ok(brief);
                }
            }
        }
    }

    /// Supervise research on `brief`
    pub async fn research(&self, brief: &ResearchBrief) -> Result<SupervisorOutcome> {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, "Research started");
        self.supervisor.run(brief, run_id, &self.cancel).await
    }

    pub fn merge(&self, brief: &ResearchBrief, outcome: &SupervisorOutcome) -> Report {
        self.aggregator.merge(brief, outcome, Utc::now())
    }

    /// Merge, then rewrite the report when synthesis is enabled
    pub async fn write(&self, brief: &ResearchBrief, outcome: &SupervisorOutcome) -> Report {
        let merged = self.merge(brief, outcome);
        match &self.synthesizer {
            Some(synthesizer) => synthesizer.rewrite(brief, merged).await,
            None => merged,
        }
    }

    pub async fn publish(&self, report: &Report) -> PublishOutcome {
        self.writer.publish(report).await
    }

    /// Full run from the user's first message.
    ///
    /// # Errors
    ///
    /// `InputValidation` for an empty request, `RunFailed` when supervision
    /// fails. Storage failures are warnings on the outcome, never errors.
    pub async fn run(&self, initial_text: &str, prompt: &dyn UserPrompt) -> Result<SessionOutcome> {
        let mut request = ResearchRequest::new(initial_text)?;
        let brief = self.scope(&mut request, prompt).await?;
        let outcome = self.research(&brief).await?;
        let report = self.write(&brief, &outcome).await;
        let publish = self.publish(&report).await;

        for warning in &publish.warnings {
            tracing::warn!(error = %warning, "Report kept despite storage failure");
        }

        Ok(SessionOutcome {
            brief,
            report,
            publish,
        })
    }
}

/// Builder for [`ResearchSession`]. Capabilities not set explicitly are
/// created from the configuration.
pub struct ResearchSessionBuilder {
    config: Arc<InquestConfig>,
    llm: Option<Arc<dyn LLMProvider>>,
    search: Option<Arc<dyn SearchProvider>>,
    local: Option<Arc<dyn StorageBackend>>,
    remote: Option<Arc<dyn StorageBackend>>,
    cancel: Option<CancellationToken>,
}

impl ResearchSessionBuilder {
    pub fn new(config: Arc<InquestConfig>) -> Self {
        Self {
            config,
            llm: None,
            search: None,
            local: None,
            remote: None,
            cancel: None,
        }
    }

    pub fn llm(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(provider);
        self
    }

    pub fn search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    pub fn local_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    pub fn remote_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.remote = Some(backend);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// # Errors
    ///
    /// Fails on invalid configuration or when a provider cannot be created.
    pub fn build(self) -> Result<ResearchSession> {
        let config = self.config;
        config.validate()?;
        let research = &config.research;
        let policy = config.capabilities.call_policy();

        let llm = match self.llm {
            Some(llm) => llm,
            None => LLMProviderFactory::create(&config.llm)?,
        };
        let llm: Arc<dyn LLMProvider> = Arc::new(GuardedProvider::new(llm, policy.clone()));

        let search = match self.search {
            Some(search) => search,
            None => search::from_config(&config.search)?,
        };

        let local = self
            .local
            .unwrap_or_else(|| Arc::new(LocalStorage::new(config.storage.local_dir.clone())));
        let remote = self.remote.or_else(|| {
            config.storage.remote_base_url.as_ref().map(|url| {
                let mut http = HttpStorage::new(url.clone());
                if let Some(ref token) = config.storage.remote_token {
                    http = http.with_token(token.clone());
                }
                Arc::new(http) as Arc<dyn StorageBackend>
            })
        });

        let router = Arc::new(
            ToolRouter::new(search, policy.clone(), research.max_concurrent_researchers)
                .with_search_results(research.search_results),
        );
        let mut researcher = Researcher::new(
            llm.clone(),
            router.clone(),
            ResearcherSettings {
                max_iterations: research.max_researcher_iterations,
                max_note_chars: research.max_note_chars,
                temperature: config.llm.temperature,
            },
        );
        if research.summarize_sources {
            researcher = researcher.with_summarizer(
                SourceSummarizer::new(llm.clone()).with_temperature(config.llm.temperature),
            );
        }
        let researcher = Arc::new(researcher);
        let pool = WorkerPool::new(router.clone(), researcher);
        let aggregator = Aggregator::new(research.report_token_budget);
        let supervisor = Supervisor::new(
            llm.clone(),
            router,
            pool,
            aggregator,
            SupervisorSettings {
                max_passes: research.max_planning_passes,
                overlap_threshold: research.overlap_threshold,
                run_deadline: research.run_deadline,
                temperature: config.llm.temperature,
            },
        );
        let synthesizer = research.synthesize_report.then(|| {
            ReportSynthesizer::new(llm.clone(), research.report_token_budget)
                .with_temperature(config.llm.temperature)
        });
        let gate = ClarificationGate::new(llm).with_temperature(config.llm.temperature);

        let mut writer = ReportWriter::new(policy).with_local(local);
        if let Some(remote) = remote {
            writer = writer.with_remote(remote);
        }

        Ok(ResearchSession {
            config,
            gate,
            supervisor,
            aggregator,
            synthesizer,
            writer,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
