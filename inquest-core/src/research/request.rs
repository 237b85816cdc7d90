//! The user's research request and its clarification exchange

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InquestError, Result};
use crate::llm::Message;

/// A single turn in the conversation (user message + assistant reply)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Turn index (0-indexed)
    pub index: usize,
    pub user_message: String,
    /// Assistant reply (None if not yet replied)
    pub assistant_message: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Turn {
    fn new(index: usize, user_message: impl Into<String>) -> Self {
        Self {
            index,
            user_message: user_message.into(),
            assistant_message: None,
            started_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.assistant_message.is_some()
    }

    /// Convert to LLM messages
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        // An unanswered question leaves an empty user turn
        if !self.user_message.is_empty() {
            messages.push(Message::user(&self.user_message));
        }
        if let Some(ref reply) = self.assistant_message {
            messages.push(Message::assistant(reply));
        }
        messages
    }

    /// Estimate token count (rough approximation: 4 chars per token)
    pub fn estimate_tokens(&self) -> usize {
        let user_tokens = self.user_message.len() / 4;
        let assistant_tokens = self
            .assistant_message
            .as_ref()
            .map(|m| m.len() / 4)
            .unwrap_or(0);
        user_tokens + assistant_tokens
    }
}

/// Raw user request plus the clarification conversation.
///
/// Turns are only ever appended. Once sealed, the request is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    turns: Vec<Turn>,
    sealed: bool,
}

impl ResearchRequest {
    /// Start a request from the user's initial text
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` if the text is empty or whitespace.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(InquestError::InputValidation(
                "research request is empty".to_string(),
            ));
        }
        Ok(Self {
            turns: vec![Turn::new(0, text.trim())],
            sealed: false,
        })
    }

    /// The user's first message
    pub fn initial_text(&self) -> &str {
        self.turns
            .first()
            .map(|t| t.user_message.as_str())
            .unwrap_or("")
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Record the assistant's clarifying question on the open turn
    pub fn record_question(&mut self, question: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        match self.turns.last_mut() {
            Some(turn) if !turn.is_complete() => {
                turn.assistant_message = Some(question.into());
                Ok(())
            }
            _ => Err(InquestError::InputValidation(
                "no open turn to attach a question to".to_string(),
            )),
        }
    }

    /// Append the user's answer as a new turn
    pub fn add_answer(&mut self, answer: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let index = self.turns.len();
        self.turns.push(Turn::new(index, answer));
        Ok(())
    }

    /// Freeze the request
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Conversation as LLM messages
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().flat_map(|t| t.to_messages()).collect()
    }

    /// Plain-text transcript, one line per message
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push_str("User: ");
            out.push_str(&turn.user_message);
            out.push('\n');
            if let Some(ref reply) = turn.assistant_message {
                out.push_str("Assistant: ");
                out.push_str(reply);
                out.push('\n');
            }
        }
        out
    }

    pub fn estimate_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.estimate_tokens()).sum()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.sealed {
            return Err(InquestError::InputValidation(
                "research request is sealed".to_string(),
            ));
        }
        Ok(())
    }
}
