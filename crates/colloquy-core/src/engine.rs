// Conversation engine
//
// The bounded state machine around the turn executor: it owns the history
// for one request, interleaves model turns with tool round-trips, and wraps
// the whole run in the client-facing lifecycle bracket.
//
// The loop has a single exit point: either a turn produces zero tool calls
// (conversation complete) or the turn budget is exhausted (policy stop, not
// an error). A backend failure mid-run is converted into one inline error
// delta; the stream still ends with the full bracket.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::ModelBackend;
use crate::content::TurnContent;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, FinishReason, StreamEvent};
use crate::executor::TurnExecutor;
use crate::message::Message;
use crate::tools::{ToolDeclaration, ToolRegistry};
use crate::transcript::adapt_messages;

/// Maximum model turns per conversation. Reaching the cap stops the loop
/// without error; it bounds a model that would call tools forever.
pub const MAX_TURNS: usize = 5;

/// Result of a complete conversation run
#[derive(Debug, Clone)]
pub struct ConversationReport {
    /// Turns actually taken
    pub turns: usize,
    /// Concatenation of all text delivered to the client
    pub final_text: String,
    /// How the stream was closed
    pub finish_reason: FinishReason,
}

/// The conversation engine.
///
/// One engine instance serves one request at a time; each `run` owns its
/// history and text accumulator, so instances can be shared across requests.
pub struct ConversationEngine<B, S>
where
    B: ModelBackend,
    S: EventSink,
{
    backend: Arc<B>,
    sink: Arc<S>,
    registry: ToolRegistry,
}

impl<B, S> ConversationEngine<B, S>
where
    B: ModelBackend + 'static,
    S: EventSink + 'static,
{
    /// Create a new engine
    pub fn new(backend: B, sink: S, registry: ToolRegistry) -> Self {
        Self {
            backend: Arc::new(backend),
            sink: Arc::new(sink),
            registry,
        }
    }

    /// Create a new engine from Arc-wrapped components
    pub fn with_arcs(backend: Arc<B>, sink: Arc<S>, registry: ToolRegistry) -> Self {
        Self {
            backend,
            sink,
            registry,
        }
    }

    /// Run a full conversation over the client transcript.
    ///
    /// Validation and catalog formatting happen before any event is emitted,
    /// so those failures surface as plain errors rather than stream content.
    /// Once the bracket is open, loop failures are delivered inline and the
    /// stream always closes cleanly.
    pub async fn run(&self, messages: &[Message]) -> Result<ConversationReport> {
        let mut history = adapt_messages(messages);
        if history.is_empty() {
            return Err(EngineError::EmptyConversation);
        }

        // Resolve the two tool representations once, before any turn runs.
        let declarations = self.registry.declarations()?;

        let text_id = Uuid::now_v7().to_string();
        self.sink.emit(StreamEvent::Start).await?;
        self.sink.emit(StreamEvent::StartStep).await?;
        self.sink.emit(StreamEvent::text_start(&text_id)).await?;

        let (turns, final_text, finish_reason) = match self
            .drive_loop(&mut history, &declarations, &text_id)
            .await
        {
            Ok((turns, final_text)) => {
                info!(turns, "Conversation completed");
                (turns, final_text, FinishReason::Stop)
            }
            Err(error) => {
                warn!(error = %error, "Conversation failed mid-stream");
                self.sink
                    .emit(StreamEvent::text_delta(
                        &text_id,
                        format!("\n[error] {error}"),
                    ))
                    .await?;
                (0, String::new(), FinishReason::Error)
            }
        };

        self.sink.emit(StreamEvent::text_end(&text_id)).await?;
        self.sink.emit(StreamEvent::FinishStep).await?;
        self.sink
            .emit(StreamEvent::finish(finish_reason))
            .await?;

        Ok(ConversationReport {
            turns,
            final_text,
            finish_reason,
        })
    }

    /// The bounded turn loop. History grows by one model turn and one tool
    /// turn per tool round-trip; a turn without tool calls completes the
    /// conversation.
    async fn drive_loop(
        &self,
        history: &mut Vec<TurnContent>,
        declarations: &[ToolDeclaration],
        text_id: &str,
    ) -> Result<(usize, String)> {
        let executor = TurnExecutor::new(Arc::clone(&self.backend), Arc::clone(&self.sink));

        let mut turns_taken = 0;
        let mut final_text = String::new();

        while turns_taken < MAX_TURNS {
            turns_taken += 1;

            let outcome = executor.run_turn(history, declarations, text_id).await?;
            final_text.push_str(&outcome.text);

            if outcome.tool_calls.is_empty() {
                break;
            }

            info!(
                turn = turns_taken,
                tool_calls = outcome.tool_calls.len(),
                "Turn requested tools"
            );

            history.push(TurnContent::model_tool_calls(outcome.tool_calls.clone()));
            let results = self.registry.dispatch_batch(&outcome.tool_calls).await;
            history.push(TurnContent::tool_results(results));
        }

        Ok((turns_taken, final_text))
    }
}
