// In-memory implementations for examples and testing
//
// ScriptedBackend replays predefined turns (including mid-stream failures),
// RecordingSink captures the emitted event sequence, and SleepTool is a
// latency-configurable tool for batch-ordering tests. None of these touch
// the network.

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::backend::{ModelBackend, TurnChunk, TurnStream};
use crate::content::{ToolCall, TurnContent};
use crate::error::{EngineError, Result};
use crate::events::{EventSink, StreamEvent};
use crate::tools::{Tool, ToolDeclaration, ToolOutcome};

// ============================================================================
// ScriptedBackend - Replays predefined turns
// ============================================================================

/// One scripted item in a turn's stream
#[derive(Debug, Clone)]
enum ScriptedItem {
    Chunk(TurnChunk),
    Error(String),
}

/// A scripted model turn: a sequence of chunks, optionally ending in an
/// error to simulate a stream that breaks mid-turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    items: Vec<ScriptedItem>,
}

impl ScriptedTurn {
    /// A turn streaming the given chunks and ending normally
    pub fn chunks(chunks: Vec<TurnChunk>) -> Self {
        Self {
            items: chunks.into_iter().map(ScriptedItem::Chunk).collect(),
        }
    }

    /// A turn streaming one text fragment per entry
    pub fn text(fragments: &[&str]) -> Self {
        Self::chunks(fragments.iter().map(|f| TurnChunk::text(*f)).collect())
    }

    /// A turn requesting the given tool calls (one chunk, no text)
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::chunks(vec![TurnChunk {
            text_fragments: Vec::new(),
            tool_calls: calls,
        }])
    }

    /// A turn that streams the given chunks and then fails
    pub fn failing_after(chunks: Vec<TurnChunk>, error: impl Into<String>) -> Self {
        let mut items: Vec<ScriptedItem> =
            chunks.into_iter().map(ScriptedItem::Chunk).collect();
        items.push(ScriptedItem::Error(error.into()));
        Self { items }
    }
}

/// Scripted model backend for testing.
///
/// Pops one scripted turn per `stream_turn` call and logs the history it
/// was called with. When the script is exhausted it answers with a plain
/// text turn, so an over-long loop fails assertions instead of hanging.
#[derive(Default, Clone)]
pub struct ScriptedBackend {
    turns: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    call_log: Arc<Mutex<Vec<Vec<TurnContent>>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one scripted turn
    pub async fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().await.push_back(turn);
    }

    /// Queue several scripted turns
    pub async fn push_turns(&self, turns: Vec<ScriptedTurn>) {
        self.turns.lock().await.extend(turns);
    }

    /// Histories this backend was called with, one entry per turn
    pub async fn calls(&self) -> Vec<Vec<TurnContent>> {
        self.call_log.lock().await.clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn stream_turn(
        &self,
        history: &[TurnContent],
        _tools: &[ToolDeclaration],
    ) -> Result<TurnStream> {
        self.call_log.lock().await.push(history.to_vec());

        let turn = self
            .turns
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text(&["Scripted backend exhausted"]));

        let items: Vec<Result<TurnChunk>> = turn
            .items
            .into_iter()
            .map(|item| match item {
                ScriptedItem::Chunk(chunk) => Ok(chunk),
                ScriptedItem::Error(message) => Err(EngineError::backend(message)),
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }
}

// ============================================================================
// RecordingSink - Captures emitted events
// ============================================================================

/// Event sink that records everything it is given
#[derive(Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in emission order
    pub async fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().await.clone()
    }

    /// Just the text deltas, in emission order
    pub async fn deltas(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                StreamEvent::TextDelta { delta, .. } => Some(delta.clone()),
                _ => None,
            })
            .collect()
    }

    /// The wire `type` names of all recorded events, in order
    pub async fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|event| match event {
                StreamEvent::Start => "start",
                StreamEvent::StartStep => "start-step",
                StreamEvent::TextStart { .. } => "text-start",
                StreamEvent::TextDelta { .. } => "text-delta",
                StreamEvent::TextEnd { .. } => "text-end",
                StreamEvent::FinishStep => "finish-step",
                StreamEvent::Finish { .. } => "finish",
            })
            .map(String::from)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

// ============================================================================
// SleepTool - Latency-configurable tool
// ============================================================================

/// Tool that sleeps for a configured duration before answering.
///
/// Useful for asserting that batch results preserve call order even when
/// completions arrive out of order.
pub struct SleepTool {
    name: String,
    delay: Duration,
    reply: Value,
}

impl SleepTool {
    pub fn new(name: impl Into<String>, delay: Duration, reply: Value) -> Self {
        Self {
            name: name.into(),
            delay,
            reply,
        }
    }
}

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps for a configured duration, then replies (for testing)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: Value) -> ToolOutcome {
        tokio::time::sleep(self.delay).await;
        ToolOutcome::success(self.reply.clone())
    }
}
