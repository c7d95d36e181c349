// Streaming chat endpoint
//
// POST /v1/chat runs one bounded conversation and streams engine events
// back as SSE frames. Validation and catalog formatting happen before the
// response starts; once the stream is open, failures arrive inline and the
// bracket still closes cleanly.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use utoipa::ToSchema;

use colloquy_core::{
    adapt_messages, ConversationEngine, EngineError, EventSink, Message, ModelBackend,
    StreamEvent, ToolRegistry,
};

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ModelBackend>,
    pub registry: ToolRegistry,
}

/// Chat request body (the client's full transcript)
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

/// Error response body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// API error that renders as a JSON body with a status code
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            detail: None,
        }
    }

    fn internal(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            detail: Some(detail.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

/// Event sink that forwards engine events into an mpsc channel.
///
/// A send failure means the receiving stream (and thus the client) is gone,
/// which the engine treats as an emission error and stops.
struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: StreamEvent) -> colloquy_core::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| EngineError::emission("client disconnected"))
    }
}

/// Create chat routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat", post(chat))
        .with_state(state)
}

/// POST /v1/chat - Run a conversation and stream events as SSE
#[utoipa::path(
    post,
    path = "/v1/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Empty or unusable transcript", body = ErrorBody),
        (status = 500, description = "Tool catalog misconfigured", body = ErrorBody)
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    tracing::info!(message_count = req.messages.len(), "Received chat request");

    // Reject unusable transcripts before the stream opens, so the client
    // gets a proper status code instead of an inline error event.
    if adapt_messages(&req.messages).is_empty() {
        return Err(ApiError::bad_request("No messages to process"));
    }

    // Surface catalog misconfiguration the same way.
    state.registry.declarations().map_err(|e| {
        tracing::error!("Tool catalog rejected: {}", e);
        ApiError::internal("Tool catalog misconfigured", e.to_string())
    })?;

    let (tx, rx) = mpsc::channel::<StreamEvent>(64);
    let engine = ConversationEngine::new(
        state.backend.clone(),
        ChannelSink { tx },
        state.registry.clone(),
    );

    tokio::spawn(async move {
        match engine.run(&req.messages).await {
            Ok(report) => {
                tracing::info!(
                    turns = report.turns,
                    finish_reason = ?report.finish_reason,
                    "Conversation finished"
                );
            }
            Err(e) => {
                tracing::error!("Conversation aborted: {}", e);
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.sse_frame()));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal("Failed to build response", e.to_string()))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use colloquy_core::memory::{ScriptedBackend, ScriptedTurn};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(backend: ScriptedBackend) -> Router {
        routes(AppState {
            backend: Arc::new(backend),
            registry: ToolRegistry::with_defaults(),
        })
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Collect the SSE body and parse each `data:` frame back into JSON
    async fn sse_events(response: Response) -> Vec<Value> {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        text.split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn empty_transcript_is_rejected_with_400() {
        let response = app(ScriptedBackend::new())
            .oneshot(chat_request(json!({ "messages": [] })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "No messages to process");
    }

    #[tokio::test]
    async fn textless_transcript_is_rejected_with_400() {
        let body = json!({
            "messages": [{ "role": "user", "parts": [{ "type": "image", "url": "x" }] }]
        });

        let response = app(ScriptedBackend::new())
            .oneshot(chat_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_streams_the_full_event_bracket() {
        let backend = ScriptedBackend::new();
        backend
            .push_turn(ScriptedTurn::text(&["Hello", " there"]))
            .await;

        let response = app(backend)
            .oneshot(chat_request(json!({
                "messages": [{ "role": "user", "parts": [{ "type": "text", "text": "hi" }] }]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let events = sse_events(response).await;
        let types: Vec<&str> = events
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            types,
            vec![
                "start",
                "start-step",
                "text-start",
                "text-delta",
                "text-delta",
                "text-end",
                "finish-step",
                "finish"
            ]
        );

        assert_eq!(events[3]["delta"], "Hello");
        assert_eq!(events[4]["delta"], " there");
        assert_eq!(events.last().unwrap()["finishReason"], "stop");

        // All text events share the one text block id
        let id = events[2]["id"].as_str().unwrap();
        assert_eq!(events[3]["id"], id);
        assert_eq!(events[5]["id"], id);
    }

    #[tokio::test]
    async fn backend_failure_streams_inline_error_and_finish() {
        let backend = ScriptedBackend::new();
        backend
            .push_turn(ScriptedTurn::failing_after(
                vec![colloquy_core::TurnChunk::text("Partial")],
                "connection reset",
            ))
            .await;

        let response = app(backend)
            .oneshot(chat_request(json!({
                "messages": [{ "role": "user", "parts": [{ "type": "text", "text": "hi" }] }]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let events = sse_events(response).await;
        let deltas: Vec<&str> = events
            .iter()
            .filter(|e| e["type"] == "text-delta")
            .map(|e| e["delta"].as_str().unwrap())
            .collect();
        assert_eq!(deltas[0], "Partial");
        assert!(deltas[1].starts_with("\n[error] "));
        assert_eq!(events.last().unwrap()["finishReason"], "error");
    }
}
