// Gemini ModelBackend driver
//
// Talks to the v1beta streamGenerateContent endpoint with alt=sse. Gemini's
// streaming is the cumulative-resend kind - a chunk may restate the whole
// accumulated turn text - so this driver forwards fragments verbatim and
// leaves deduplication to the engine's reconciler.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;

use colloquy_core::backend::{ModelBackend, TurnChunk, TurnStream};
use colloquy_core::content::{Part, ToolCall, TurnContent, TurnRole};
use colloquy_core::error::{EngineError, Result};
use colloquy_core::tools::ToolDeclaration;

use crate::types::{
    GenerateContentChunk, GenerateContentRequest, WireContent, WireFunctionDeclaration, WirePart,
    WireTool,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini model backend.
///
/// # Example
///
/// ```ignore
/// use colloquy_gemini::GeminiBackend;
///
/// let backend = GeminiBackend::new("your-api-key", "gemini-2.0-flash");
/// // or with a custom endpoint
/// let backend = GeminiBackend::with_base_url("key", "gemini-2.0-flash", "http://localhost:8080");
/// ```
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    /// Create a new backend with the given API key and model name
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create a new backend with a custom base URL (for proxies and tests)
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

fn convert_role(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
        // v1beta only accepts user/model roles on contents; function
        // responses travel under the user role.
        TurnRole::Tool => "user",
    }
}

/// Gemini requires functionResponse payloads to be JSON objects.
fn as_response_object(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        serde_json::json!({ "result": value })
    }
}

fn convert_content(turn: &TurnContent) -> WireContent {
    let parts = turn
        .parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => WirePart::text(text.clone()),
            Part::ToolCall(call) => WirePart::function_call(&call.name, call.arguments.clone()),
            Part::ToolResult(result) => WirePart::function_response(
                &result.name,
                as_response_object(result.envelope.to_response_value()),
            ),
        })
        .collect();

    WireContent {
        role: Some(convert_role(turn.role).to_string()),
        parts,
    }
}

fn convert_tools(tools: &[ToolDeclaration]) -> Option<Vec<WireTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(vec![WireTool {
        function_declarations: tools
            .iter()
            .map(|tool| WireFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect(),
    }])
}

fn convert_chunk(chunk: GenerateContentChunk) -> TurnChunk {
    let mut converted = TurnChunk::default();

    if let Some(content) = chunk.candidates.into_iter().next().and_then(|c| c.content) {
        for part in content.parts {
            if let Some(text) = part.text {
                converted.text_fragments.push(text);
            }
            if let Some(call) = part.function_call {
                converted
                    .tool_calls
                    .push(ToolCall::new(call.name, call.args));
            }
        }
    }

    converted
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn stream_turn(
        &self,
        history: &[TurnContent],
        tools: &[ToolDeclaration],
    ) -> Result<TurnStream> {
        let request = GenerateContentRequest {
            contents: history.iter().map(convert_content).collect(),
            tools: convert_tools(tools),
        };

        tracing::debug!(
            model = %self.model,
            turns = history.len(),
            tools = tools.len(),
            "Sending streaming generate request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::backend(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::backend(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let event_stream = response.bytes_stream().eventsource();

        let converted: TurnStream = Box::pin(event_stream.map(|result| match result {
            Ok(event) => match serde_json::from_str::<GenerateContentChunk>(&event.data) {
                Ok(chunk) => Ok(convert_chunk(chunk)),
                Err(e) => Err(EngineError::backend(format!(
                    "Malformed stream chunk: {}",
                    e
                ))),
            },
            Err(e) => Err(EngineError::backend(format!("Stream error: {}", e))),
        }));

        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::content::{ResultEnvelope, ToolResult};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn history_maps_to_gemini_contents() {
        let history = vec![
            TurnContent::user_text("what's the time?"),
            TurnContent::model_tool_calls(vec![ToolCall::new("current_time", json!({}))]),
            TurnContent::tool_results(vec![ToolResult::new(
                "current_time",
                ResultEnvelope::success(json!({"current_time": "2026-01-01T00:00:00Z"})),
            )]),
        ];

        let contents: Vec<WireContent> = history.iter().map(convert_content).collect();
        let json = serde_json::to_value(&contents).unwrap();

        assert_eq!(
            json,
            json!([
                {"role": "user", "parts": [{"text": "what's the time?"}]},
                {"role": "model", "parts": [{"functionCall": {"name": "current_time", "args": {}}}]},
                {"role": "user", "parts": [{"functionResponse": {
                    "name": "current_time",
                    "response": {"current_time": "2026-01-01T00:00:00Z"}
                }}]}
            ])
        );
    }

    #[test]
    fn failed_tool_result_maps_to_error_object() {
        let turn = TurnContent::tool_results(vec![ToolResult::new(
            "lookup",
            ResultEnvelope::failure("Tool not found"),
        )]);

        let json = serde_json::to_value(convert_content(&turn)).unwrap();
        assert_eq!(
            json["parts"][0]["functionResponse"]["response"],
            json!({"error": "Tool not found"})
        );
    }

    #[test]
    fn declarations_fold_into_one_tool_entry() {
        let tools = vec![
            ToolDeclaration {
                name: "echo".into(),
                description: "Echo a message".into(),
                parameters: json!({"type": "object"}),
            },
            ToolDeclaration {
                name: "current_time".into(),
                description: "Get the time".into(),
                parameters: json!({"type": "object"}),
            },
        ];

        let wire = convert_tools(&tools).unwrap();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].function_declarations.len(), 2);
        assert_eq!(wire[0].function_declarations[0].name, "echo");

        assert!(convert_tools(&[]).is_none());
    }

    #[test]
    fn chunk_with_text_and_call_maps_to_both() {
        let chunk: GenerateContentChunk = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Let me check."},
                        {"functionCall": {"name": "lookup", "args": {"q": "rust"}}}
                    ]
                }
            }]
        }))
        .unwrap();

        let converted = convert_chunk(chunk);
        assert_eq!(converted.text_fragments, vec!["Let me check."]);
        assert_eq!(converted.tool_calls.len(), 1);
        assert_eq!(converted.tool_calls[0].name, "lookup");
        assert_eq!(converted.tool_calls[0].arguments, json!({"q": "rust"}));
    }

    #[test]
    fn empty_chunk_maps_to_empty() {
        let chunk: GenerateContentChunk = serde_json::from_value(json!({})).unwrap();
        assert!(convert_chunk(chunk).is_empty());
    }

    #[tokio::test]
    async fn streams_chunks_from_sse_body() {
        let server = MockServer::start().await;

        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hello\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hello World\"}]}}]}\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let backend = GeminiBackend::with_base_url("test-key", "gemini-2.0-flash", server.uri());
        let history = vec![TurnContent::user_text("hi")];

        let mut stream = backend.stream_turn(&history, &[]).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.text_fragments, vec!["Hello"]);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.text_fragments, vec!["Hello World"]);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_a_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let backend = GeminiBackend::with_base_url("test-key", "gemini-2.0-flash", server.uri());
        let history = vec![TurnContent::user_text("hi")];

        let err = backend.stream_turn(&history, &[]).await.err().unwrap();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("quota exceeded"));
    }
}
