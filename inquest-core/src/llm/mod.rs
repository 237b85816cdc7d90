//! Reasoning capability
//!
//! The orchestration core only ever talks to an [`LLMProvider`]. A provider takes
//! role-tagged messages plus the tools on offer and answers with either text or a
//! list of requested tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{InquestError, Result};
use crate::tools::{ToolName, ToolSpec};

/// Helper to request structured (JSON) output and deserialize it.
///
/// Accepts replies wrapped in a Markdown code fence, which several models emit
/// even when asked for bare JSON.
pub async fn generate_structured_output<T: DeserializeOwned>(
    provider: &dyn LLMProvider,
    request: &LLMRequest,
) -> Result<T> {
    let mut request = request.clone();
    request.json_output = true;

    let response = provider.complete(&request).await?;
    let text = response.text().ok_or_else(|| {
        InquestError::Other("Expected structured text output, got tool calls".to_string())
    })?;

    let json = extract_json(text);
    serde_json::from_str(json).map_err(InquestError::Serialization)
}

fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"));
    match unfenced {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,

    /// Tool calls requested by the assistant in this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<RequestedToolCall>,

    /// For `Tool` messages: the call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    /// Assistant turn that requested tool calls
    pub fn assistant_tool_calls(calls: Vec<RequestedToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Result of a tool call, fed back to the model
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool call requested by the model, not yet validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedToolCall {
    /// Provider-assigned call id
    pub id: String,
    /// Tool name as sent by the model
    pub name: String,
    /// Raw arguments
    pub arguments: Value,
}

impl RequestedToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Request to an LLM provider
#[derive(Debug, Clone)]
pub struct LLMRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,

    /// Tools the model may call
    pub tools: Vec<ToolSpec>,

    /// Temperature for generation (0.0-2.0)
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,

    /// Ask the provider for a JSON object reply
    pub json_output: bool,
}

impl LLMRequest {
    /// Create a simple request from a single prompt
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::from_messages(vec![Message::user(prompt)])
    }

    /// Create a request from a message list
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            json_output: false,
        }
    }

    /// Create a request with system prompt
    pub fn with_system_prompt(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self::from_messages(vec![Message::system(system_prompt), Message::user(user_prompt)])
    }

    /// Offer tools to the model
    pub fn with_tools(mut self, tools: &[ToolName]) -> Self {
        self.tools = tools.iter().map(|t| t.spec()).collect();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Whether a tool is on offer in this request
    pub fn offers(&self, tool: ToolName) -> bool {
        self.tools.iter().any(|t| t.name == tool.as_str())
    }
}

/// What the model produced
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A plain text turn
    Text(String),
    /// One or more tool calls
    ToolCalls(Vec<RequestedToolCall>),
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// Generated output
    pub output: ModelOutput,

    /// Token usage information
    pub usage: Option<TokenUsage>,
}

impl LLMResponse {
    /// Text response
    pub fn text_response(content: impl Into<String>) -> Self {
        Self {
            output: ModelOutput::Text(content.into()),
            usage: None,
        }
    }

    /// Response requesting a single tool call
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::tool_calls(vec![RequestedToolCall::new("call_0", name, arguments)])
    }

    /// Response requesting several tool calls
    pub fn tool_calls(calls: Vec<RequestedToolCall>) -> Self {
        Self {
            output: ModelOutput::ToolCalls(calls),
            usage: None,
        }
    }

    /// Text content, if this is a text turn
    pub fn text(&self) -> Option<&str> {
        match &self.output {
            ModelOutput::Text(t) => Some(t),
            ModelOutput::ToolCalls(_) => None,
        }
    }

    /// Requested tool calls (empty for a text turn)
    pub fn requested_calls(&self) -> &[RequestedToolCall] {
        match &self.output {
            ModelOutput::Text(_) => &[],
            ModelOutput::ToolCalls(calls) => calls,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Trait for reasoning capability implementations.
///
/// Implementations must tolerate being called concurrently from several
/// researcher workers.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Run one completion over the accumulated conversation
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse>;

    /// Get model information
    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "unknown".to_string(),
            model_name: "unknown".to_string(),
        }
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub provider: String,
    pub model_name: String,
}

/// Provider decorator that puts every completion under a [`CallPolicy`]
pub struct GuardedProvider {
    inner: Arc<dyn LLMProvider>,
    policy: CallPolicy,
}

impl GuardedProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, policy: CallPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LLMProvider for GuardedProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse> {
        self.policy
            .run("reasoning", move || self.inner.complete(request))
            .await
    }

    fn model_info(&self) -> ModelInfo {
        self.inner.model_info()
    }
}

pub mod factory;
pub mod providers;
pub mod retry;
pub mod scripted;

pub use factory::LLMProviderFactory;
pub use retry::{CallPolicy, RetryConfig, with_retry_if};
pub use scripted::ScriptedProvider;
