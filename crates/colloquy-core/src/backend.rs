// Model backend abstraction
//
// A ModelBackend turns conversation history plus a tool catalog into a
// streamed sequence of chunks. A chunk may legally carry both text fragments
// and tool calls; the turn executor processes text first, then calls.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::content::{ToolCall, TurnContent};
use crate::error::Result;
use crate::tools::ToolDeclaration;

/// Type alias for the backend's streamed turn output
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnChunk>> + Send>>;

/// One streamed chunk of a model turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnChunk {
    /// Raw text fragments, in arrival order. May be true deltas or
    /// cumulative resends; the reconciler sorts that out.
    pub text_fragments: Vec<String>,
    /// Tool calls requested in this chunk, in arrival order
    pub tool_calls: Vec<ToolCall>,
}

impl TurnChunk {
    /// A chunk carrying a single text fragment
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            text_fragments: vec![fragment.into()],
            tool_calls: Vec::new(),
        }
    }

    /// A chunk carrying a single tool call
    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            text_fragments: Vec::new(),
            tool_calls: vec![call],
        }
    }

    /// Add a text fragment
    pub fn with_text(mut self, fragment: impl Into<String>) -> Self {
        self.text_fragments.push(fragment.into());
        self
    }

    /// Add a tool call
    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text_fragments.is_empty() && self.tool_calls.is_empty()
    }
}

/// Trait for streaming model backends.
///
/// Implementations handle provider-specific request building and response
/// parsing. Errors are not retried here; a broken stream fails the turn.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Submit the conversation so far plus the tool catalog, and stream the
    /// model's next turn.
    async fn stream_turn(
        &self,
        history: &[TurnContent],
        tools: &[ToolDeclaration],
    ) -> Result<TurnStream>;
}

#[async_trait]
impl ModelBackend for Box<dyn ModelBackend> {
    async fn stream_turn(
        &self,
        history: &[TurnContent],
        tools: &[ToolDeclaration],
    ) -> Result<TurnStream> {
        (**self).stream_turn(history, tools).await
    }
}

#[async_trait]
impl<T: ModelBackend + ?Sized> ModelBackend for Arc<T> {
    async fn stream_turn(
        &self,
        history: &[TurnContent],
        tools: &[ToolDeclaration],
    ) -> Result<TurnStream> {
        (**self).stream_turn(history, tools).await
    }
}
