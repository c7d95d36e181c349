// Model-facing conversation content
//
// TurnContent is the unit of conversation history: one turn of role-tagged
// parts. Role invariants (a `tool` turn carries only tool results, a `model`
// turn never carries tool results) are upheld by the constructors, so the
// rest of the engine can rely on well-formed history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a turn in the model-facing conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
    Tool,
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name to execute
    pub name: String,
    /// Arguments as JSON
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Uniform envelope for a tool invocation outcome.
///
/// Both resolution failures ("Tool not found") and invocation failures are
/// carried as `ok: false` envelopes so the model can react to them; the
/// surrounding loop never aborts over a failed tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Whether the invocation succeeded
    pub ok: bool,
    /// Result payload (success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error text (failure)
    #[serde(rename = "errorText", skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ResultEnvelope {
    /// Create a success envelope
    pub fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error_text: None,
        }
    }

    /// Create a failure envelope
    pub fn failure(error_text: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: None,
            error_text: Some(error_text.into()),
        }
    }

    /// Reserved envelope for unresolvable tool names
    pub fn not_found() -> Self {
        Self::failure("Tool not found")
    }

    /// The JSON the model sees for this envelope
    pub fn to_response_value(&self) -> Value {
        match (&self.payload, &self.error_text) {
            (Some(payload), _) => payload.clone(),
            (None, Some(err)) => serde_json::json!({ "error": err }),
            (None, None) => Value::Null,
        }
    }
}

/// Result of one tool invocation, tagged with the originating tool name
/// so the model can correlate result to request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub envelope: ResultEnvelope,
}

impl ToolResult {
    pub fn new(name: impl Into<String>, envelope: ResultEnvelope) -> Self {
        Self {
            name: name.into(),
            envelope,
        }
    }
}

/// A single content fragment within a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text { text: String },
    /// A tool call requested by the model
    ToolCall(ToolCall),
    /// The outcome of one tool call, fed back to the model
    ToolResult(ToolResult),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

/// One turn of model-facing conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnContent {
    pub role: TurnRole,
    pub parts: Vec<Part>,
}

impl TurnContent {
    /// A user turn carrying plain text
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            parts: vec![Part::text(text)],
        }
    }

    /// A model turn carrying plain text
    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// A model turn carrying the tool calls it requested
    pub fn model_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: TurnRole::Model,
            parts: calls.into_iter().map(Part::ToolCall).collect(),
        }
    }

    /// A tool turn carrying one result per executed call
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: TurnRole::Tool,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    /// Concatenated text of all text parts
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All tool calls in this turn, in part order
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// All tool results in this turn, in part order
    pub fn tool_results_parts(&self) -> Vec<&ToolResult> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }
}
