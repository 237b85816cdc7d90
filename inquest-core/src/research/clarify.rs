//! Clarification gate
//!
//! Decides, before any research starts, whether the request needs a clarifying
//! question. At most [`MAX_CLARIFICATION_ROUNDS`] questions are ever asked; when
//! the rounds run out the gate produces a brief from whatever it has.

use serde::Deserialize;
use std::sync::Arc;

use super::brief::ResearchBrief;
use super::prompts;
use super::request::ResearchRequest;
use crate::config::MAX_CLARIFICATION_ROUNDS;
use crate::error::{InquestError, Result};
use crate::llm::{LLMProvider, LLMRequest, Message, generate_structured_output};

/// Phase of the clarification exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationPhase {
    AwaitingInput,
    NeedClarification,
    BriefReady,
}

/// One question and the user's answer, if any
#[derive(Debug, Clone, PartialEq)]
pub struct ClarificationExchange {
    pub question: String,
    pub answer: Option<String>,
}

/// Gate state for one session
#[derive(Debug, Clone)]
pub struct ClarificationState {
    round: usize,
    max_rounds: usize,
    phase: ClarificationPhase,
    transcript: Vec<ClarificationExchange>,
    brief: Option<ResearchBrief>,
    acknowledgement: Option<String>,
}

impl ClarificationState {
    /// `max_rounds` is clamped to [`MAX_CLARIFICATION_ROUNDS`]
    pub fn new(max_rounds: usize) -> Self {
        Self {
            round: 0,
            max_rounds: max_rounds.min(MAX_CLARIFICATION_ROUNDS),
            phase: ClarificationPhase::AwaitingInput,
            transcript: Vec::new(),
            brief: None,
            acknowledgement: None,
        }
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn phase(&self) -> ClarificationPhase {
        self.phase
    }

    pub fn transcript(&self) -> &[ClarificationExchange] {
        &self.transcript
    }

    pub fn brief(&self) -> Option<&ResearchBrief> {
        self.brief.as_ref()
    }

    /// Message the model gave when it decided research can start
    pub fn acknowledgement(&self) -> Option<&str> {
        self.acknowledgement.as_deref()
    }

    /// Record the user's reply to the pending question. Blank answers count as
    /// no answer.
    pub fn record_answer(&mut self, answer: Option<String>) {
        if self.phase != ClarificationPhase::NeedClarification {
            return;
        }
        if let Some(last) = self.transcript.last_mut() {
            last.answer = answer.filter(|a| !a.trim().is_empty());
        }
        self.phase = ClarificationPhase::AwaitingInput;
    }

    fn rounds_left(&self) -> bool {
        self.round < self.max_rounds
    }
}

/// What the gate decided
#[derive(Debug, Clone, PartialEq)]
pub enum ClarificationOutcome {
    /// Ask the user this before researching
    Question(String),
    /// Research can start
    Brief(ResearchBrief),
}

#[derive(Debug, Deserialize)]
struct ClarifyDecision {
    need_clarification: bool,
    #[serde(default)]
    question: String,
    #[serde(default)]
    verification: String,
}

#[derive(Debug, Deserialize)]
struct BriefDraft {
    research_brief: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    timeframe: Option<String>,
    #[serde(default)]
    entities: Vec<String>,
}

/// Decides between asking a question and producing the research brief
pub struct ClarificationGate {
    llm: Arc<dyn LLMProvider>,
    temperature: Option<f32>,
}

impl ClarificationGate {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            llm,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Advance the gate by one step.
    ///
    /// Returns a question (round counter incremented) or the final brief.
    /// Once rounds are exhausted a brief is always produced. Calling this
    /// after the brief is ready returns the same brief again.
    pub async fn evaluate(
        &self,
        state: &mut ClarificationState,
        request: &ResearchRequest,
    ) -> Result<ClarificationOutcome> {
        if let (ClarificationPhase::BriefReady, Some(brief)) = (state.phase, &state.brief) {
            return Ok(ClarificationOutcome::Brief(brief.clone()));
        }
        if state.phase == ClarificationPhase::NeedClarification {
            return Err(InquestError::InputValidation(
                "clarifying question is still awaiting an answer".to_string(),
            ));
        }
        if request.initial_text().trim().is_empty() {
            return Err(InquestError::InputValidation(
                "research request is empty".to_string(),
            ));
        }

        if state.rounds_left() {
            if let Some(question) = self.decide(state, request).await {
                state.round += 1;
                state.phase = ClarificationPhase::NeedClarification;
                state.transcript.push(ClarificationExchange {
                    question: question.clone(),
                    answer: None,
                });
                tracing::info!(round = state.round, "Asking clarifying question");
                return Ok(ClarificationOutcome::Question(question));
            }
        } else {
            tracing::info!(
                rounds = state.round,
                "Clarification rounds exhausted; writing brief from transcript"
            );
        }

        let brief = self.write_brief(request).await;
        state.phase = ClarificationPhase::BriefReady;
        state.brief = Some(brief.clone());
        Ok(ClarificationOutcome::Brief(brief))
    }

    /// Ask whether a question is needed. Any failure means "no".
    async fn decide(&self, state: &mut ClarificationState, request: &ResearchRequest) -> Option<String> {
        let mut messages = vec![Message::system(prompts::clarify_system())];
        messages.extend(request.to_messages());
        let llm_request = self.request(messages);

        match generate_structured_output::<ClarifyDecision>(self.llm.as_ref(), &llm_request).await {
            Ok(decision) => {
                if !decision.verification.trim().is_empty() {
                    state.acknowledgement = Some(decision.verification.trim().to_string());
                }
                let question = decision.question.trim();
                (decision.need_clarification && !question.is_empty()).then(|| question.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Clarification decision unusable; proceeding without one");
                None
            }
        }
    }

    async fn write_brief(&self, request: &ResearchRequest) -> ResearchBrief {
        let mut messages = vec![Message::system(prompts::brief_system())];
        messages.extend(request.to_messages());
        let llm_request = self.request(messages);

        let drafted = generate_structured_output::<BriefDraft>(self.llm.as_ref(), &llm_request)
            .await
            .and_then(|draft| {
                Ok(ResearchBrief::new(draft.research_brief)?
                    .with_scope(draft.scope.unwrap_or_default())
                    .with_timeframe(draft.timeframe.unwrap_or_default())
                    .with_entities(draft.entities))
            });

        match drafted {
            Ok(brief) => brief,
            Err(e) => {
                tracing::warn!(error = %e, "Brief generation failed; using request transcript");
                fallback_brief(request)
            }
        }
    }

    fn request(&self, messages: Vec<Message>) -> LLMRequest {
        let request = LLMRequest::from_messages(messages);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

/// Brief built from the user's own words
fn fallback_brief(request: &ResearchRequest) -> ResearchBrief {
    let answers: Vec<&str> = request
        .turns()
        .iter()
        .skip(1)
        .map(|t| t.user_message.trim())
        .filter(|a| !a.is_empty())
        .collect();

    let goal = request.initial_text().trim().to_string();
    let scope = answers.join("; ");
    ResearchBrief {
        goal,
        scope: None,
        timeframe: None,
        entities: Vec::new(),
    }
    .with_scope(scope)
}
