// Turn executor
//
// Drives one request/response cycle against the model backend: submits the
// conversation so far, consumes the streamed chunks, routes text fragments
// through the reconciler (emitting deltas immediately, in order), and
// collects tool calls. Backend stream errors propagate to the caller; no
// retry decision is made here.

use futures::StreamExt;
use tracing::debug;

use crate::backend::ModelBackend;
use crate::content::{ToolCall, TurnContent};
use crate::error::Result;
use crate::events::{EventSink, StreamEvent};
use crate::reconcile::TextAccumulator;
use crate::tools::ToolDeclaration;

/// Outcome of one model turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Full reconciled text of the turn
    pub text: String,
    /// Tool calls requested during the turn, in arrival order
    pub tool_calls: Vec<ToolCall>,
}

/// Executes single model turns against a backend, streaming deltas to a sink.
pub struct TurnExecutor<B, S>
where
    B: ModelBackend,
    S: EventSink,
{
    backend: B,
    sink: S,
}

impl<B, S> TurnExecutor<B, S>
where
    B: ModelBackend,
    S: EventSink,
{
    pub fn new(backend: B, sink: S) -> Self {
        Self { backend, sink }
    }

    /// Run one turn over the given history.
    ///
    /// `text_id` is the client-facing text block the deltas belong to.
    /// The text accumulator is fresh for every turn.
    pub async fn run_turn(
        &self,
        history: &[TurnContent],
        tools: &[ToolDeclaration],
        text_id: &str,
    ) -> Result<TurnOutcome> {
        let mut stream = self.backend.stream_turn(history, tools).await?;

        let mut accumulator = TextAccumulator::new();
        let mut tool_calls = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            // Text before calls within a chunk.
            for fragment in &chunk.text_fragments {
                if let Some(delta) = accumulator.absorb(fragment) {
                    self.sink
                        .emit(StreamEvent::text_delta(text_id, delta))
                        .await?;
                }
            }

            tool_calls.extend(chunk.tool_calls);
        }

        debug!(
            text_len = accumulator.text().len(),
            tool_calls = tool_calls.len(),
            "Turn stream exhausted"
        );

        Ok(TurnOutcome {
            text: accumulator.into_text(),
            tool_calls,
        })
    }
}
