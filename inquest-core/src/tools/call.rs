//! Closed set of research tools and their argument schemas
//!
//! The reasoning capability requests tools by name with JSON arguments. Those
//! requests are parsed into [`ToolCall`] before anything runs; an unknown name or
//! arguments that do not match the tool's schema never reach a capability.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::result::{ToolError, ValidationError};

/// Upper bound accepted for `search.max_results`
pub const MAX_SEARCH_RESULTS: usize = 20;

/// Name of a research tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Web search for one query
    Search,
    /// Record a reflection and decide whether to keep researching
    Reflect,
    /// Hand sub-topics to researcher workers
    Delegate,
    /// Signal that research is complete
    Complete,
}

impl ToolName {
    /// All tools, in declaration order
    pub const ALL: [ToolName; 4] = [
        ToolName::Search,
        ToolName::Reflect,
        ToolName::Delegate,
        ToolName::Complete,
    ];

    /// Wire name of the tool
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Search => "search",
            ToolName::Reflect => "reflect",
            ToolName::Delegate => "delegate",
            ToolName::Complete => "complete",
        }
    }

    /// Parse a wire name
    pub fn parse(name: &str) -> Result<Self, ToolError> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| ToolError::unknown_tool(name))
    }

    /// Description shown to the reasoning capability
    pub fn description(&self) -> &'static str {
        match self {
            ToolName::Search => {
                "Search the web for a single focused query. Returns sources with url, title and content."
            }
            ToolName::Reflect => {
                "Reflect on the findings gathered so far. Decide `continue` (optionally with a refined next_query) or `stop` when the findings are sufficient."
            }
            ToolName::Delegate => {
                "Delegate independent research sub-topics to researcher workers. Each topic must be self-contained and must not repeat already covered topics."
            }
            ToolName::Complete => {
                "Declare that the gathered research is sufficient to write the final report."
            }
        }
    }

    /// JSON Schema of the tool arguments
    pub fn schema(&self) -> ToolSchema {
        let parameters = match self {
            ToolName::Search => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "A single search query" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": MAX_SEARCH_RESULTS }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            ToolName::Reflect => json!({
                "type": "object",
                "properties": {
                    "reflection": { "type": "string", "description": "Findings, gaps and next step" },
                    "decision": { "type": "string", "enum": ["continue", "stop"] },
                    "next_query": { "type": "string", "description": "Refined query for the next search" }
                },
                "required": ["reflection", "decision"],
                "additionalProperties": false
            }),
            ToolName::Delegate => json!({
                "type": "object",
                "properties": {
                    "topics": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1
                    }
                },
                "required": ["topics"],
                "additionalProperties": false
            }),
            ToolName::Complete => json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string", "description": "Why research is complete" }
                },
                "additionalProperties": false
            }),
        };
        ToolSchema::new(parameters)
    }

    /// Definition offered to the reasoning capability
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            schema: self.schema(),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::parse(s)
    }
}

/// JSON Schema for tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// JSON Schema for input parameters
    pub parameters: Value,

    /// Whether strict validation is required
    pub strict: bool,
}

impl ToolSchema {
    /// Create a schema from a JSON Schema value
    pub fn new(parameters: Value) -> Self {
        Self {
            parameters,
            strict: true,
        }
    }
}

/// A tool as advertised to the reasoning capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: ToolSchema,
}

/// Arguments of `search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl SearchArgs {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

/// Control decision carried by a reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectDecision {
    Continue,
    Stop,
}

/// Arguments of `reflect`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReflectArgs {
    pub reflection: String,
    pub decision: ReflectDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_query: Option<String>,
}

/// Arguments of `delegate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegateArgs {
    pub topics: Vec<String>,
}

/// Arguments of `complete`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Search(SearchArgs),
    Reflect(ReflectArgs),
    Delegate(DelegateArgs),
    Complete(CompleteArgs),
}

impl ToolCall {
    /// Parse and validate a raw invocation
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolError> {
        let tool = ToolName::parse(name)?;

        // Some providers send `null` for tools without arguments
        let args = match args {
            Value::Null => json!({}),
            Value::Object(_) => args.clone(),
            _ => {
                return Err(ToolError::validation(vec![ValidationError::new(
                    "args",
                    "arguments must be a JSON object",
                )]));
            }
        };

        let call = match tool {
            ToolName::Search => ToolCall::Search(decode(args)?),
            ToolName::Reflect => ToolCall::Reflect(decode(args)?),
            ToolName::Delegate => ToolCall::Delegate(decode(args)?),
            ToolName::Complete => ToolCall::Complete(decode(args)?),
        };

        let errors = call.validate();
        if errors.is_empty() {
            Ok(call)
        } else {
            Err(ToolError::validation(errors))
        }
    }

    /// The tool this call targets
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::Search(_) => ToolName::Search,
            ToolCall::Reflect(_) => ToolName::Reflect,
            ToolCall::Delegate(_) => ToolName::Delegate,
            ToolCall::Complete(_) => ToolName::Complete,
        }
    }

    /// Serialized arguments
    pub fn args(&self) -> Value {
        let value = match self {
            ToolCall::Search(a) => serde_json::to_value(a),
            ToolCall::Reflect(a) => serde_json::to_value(a),
            ToolCall::Delegate(a) => serde_json::to_value(a),
            ToolCall::Complete(a) => serde_json::to_value(a),
        };
        value.unwrap_or(Value::Null)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        match self {
            ToolCall::Search(args) => {
                if args.query.trim().is_empty() {
                    errors.push(ValidationError::new("query", "must not be empty").with_code("EMPTY"));
                }
                if let Some(n) = args.max_results {
                    if n == 0 || n > MAX_SEARCH_RESULTS {
                        errors.push(ValidationError::new(
                            "max_results",
                            format!("must be between 1 and {}", MAX_SEARCH_RESULTS),
                        ));
                    }
                }
            }
            ToolCall::Reflect(args) => {
                if let Some(ref q) = args.next_query {
                    if q.trim().is_empty() {
                        errors.push(
                            ValidationError::new("next_query", "must not be empty when present")
                                .with_code("EMPTY"),
                        );
                    }
                }
            }
            ToolCall::Delegate(args) => {
                if args.topics.is_empty() {
                    errors.push(ValidationError::new("topics", "at least one topic is required"));
                }
                for (i, topic) in args.topics.iter().enumerate() {
                    if topic.trim().is_empty() {
                        errors.push(
                            ValidationError::new(format!("topics[{}]", i), "must not be empty")
                                .with_code("EMPTY"),
                        );
                    }
                }
            }
            ToolCall::Complete(_) => {}
        }
        errors
    }
}

fn decode<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| {
        ToolError::validation(vec![ValidationError::new("args", e.to_string()).with_code("SCHEMA")])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolErrorKind;

    #[test]
    fn test_parse_search() {
        let call = ToolCall::parse("search", &json!({"query": "qubits", "max_results": 3})).unwrap();
        assert_eq!(
            call,
            ToolCall::Search(SearchArgs::new("qubits").with_max_results(3))
        );
        assert_eq!(call.name(), ToolName::Search);
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let err = ToolCall::parse("browse", &json!({})).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Validation);
        assert_eq!(err.code.as_deref(), Some("UNKNOWN_TOOL"));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        // wrong type
        let err = ToolCall::parse("search", &json!({"query": 42})).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Validation);

        // unknown field
        assert!(ToolCall::parse("search", &json!({"query": "a", "depth": 2})).is_err());

        // missing decision
        assert!(ToolCall::parse("reflect", &json!({"reflection": "ok"})).is_err());

        // not an object
        assert!(ToolCall::parse("delegate", &json!(["a", "b"])).is_err());
    }

    #[test]
    fn test_semantic_validation() {
        assert!(ToolCall::parse("search", &json!({"query": "   "})).is_err());
        assert!(ToolCall::parse("search", &json!({"query": "a", "max_results": 0})).is_err());
        assert!(ToolCall::parse("delegate", &json!({"topics": []})).is_err());
        assert!(ToolCall::parse("delegate", &json!({"topics": ["ok", ""]})).is_err());
        assert!(
            ToolCall::parse(
                "reflect",
                &json!({"reflection": "", "decision": "continue", "next_query": " "})
            )
            .is_err()
        );
    }

    #[test]
    fn test_complete_accepts_null_args() {
        let call = ToolCall::parse("complete", &Value::Null).unwrap();
        assert_eq!(call, ToolCall::Complete(CompleteArgs::default()));
    }

    #[test]
    fn test_reflect_decision_values() {
        let call = ToolCall::parse(
            "reflect",
            &json!({"reflection": "need more", "decision": "continue", "next_query": "ion traps"}),
        )
        .unwrap();
        match call {
            ToolCall::Reflect(args) => {
                assert_eq!(args.decision, ReflectDecision::Continue);
                assert_eq!(args.next_query.as_deref(), Some("ion traps"));
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[test]
    fn test_spec_lists_required_fields() {
        let spec = ToolName::Delegate.spec();
        assert_eq!(spec.name, "delegate");
        assert_eq!(spec.schema.parameters["required"], json!(["topics"]));
    }
}
