// Wire protocol events
//
// StreamEvent is the client-facing event stream: a fixed lifecycle bracket
// around zero or more text deltas. On the wire each event is one JSON object
// prefixed with `data: ` and terminated by a blank line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Why the stream finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// Normal completion, including turn-budget exhaustion
    Stop,
    /// The bracket closed after an inline error delta
    Error,
}

/// Events emitted to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Stream opened
    Start,
    /// First turn about to run
    StartStep,
    /// Text block opened
    TextStart { id: String },
    /// Incremental text; appended, never repeated, by the client
    TextDelta { id: String, delta: String },
    /// Text block closed
    TextEnd { id: String },
    /// Loop finished
    FinishStep,
    /// Stream closing
    Finish {
        #[serde(rename = "finishReason")]
        finish_reason: FinishReason,
    },
}

impl StreamEvent {
    pub fn text_start(id: impl Into<String>) -> Self {
        StreamEvent::TextStart { id: id.into() }
    }

    pub fn text_delta(id: impl Into<String>, delta: impl Into<String>) -> Self {
        StreamEvent::TextDelta {
            id: id.into(),
            delta: delta.into(),
        }
    }

    pub fn text_end(id: impl Into<String>) -> Self {
        StreamEvent::TextEnd { id: id.into() }
    }

    pub fn finish(finish_reason: FinishReason) -> Self {
        StreamEvent::Finish { finish_reason }
    }

    /// Serialize as one wire frame: `data: {json}\n\n`
    pub fn sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("data: {}\n\n", json)
    }
}

/// Trait for the output channel events are written to.
///
/// An emit error means the client is gone; in-flight work is abandoned at
/// the next emission.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit a single event
    async fn emit(&self, event: StreamEvent) -> Result<()>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        (**self).emit(event).await
    }
}
