// Conversation-Turn Engine
//
// This crate implements the interaction protocol between a chat client and a
// tool-calling model backend: a bounded multi-turn loop that interleaves
// model text, tool-call requests, tool execution, and re-submission of tool
// results, while emitting a clean character-level delta stream.
//
// Key design decisions:
// - Traits at the seams (ModelBackend, EventSink, Tool) for pluggable
//   backends and transports
// - Delta reconciliation is one pure function (reconcile), so the
//   accumulate-then-diff behavior is unit-testable without any streaming
//   harness
// - The conversation loop is an explicit bounded state machine with its exit
//   checked in one place
// - Tool failures never abort the loop; they are folded into result
//   envelopes the model can react to
// - In-memory fakes (ScriptedBackend, RecordingSink) make the whole engine
//   testable without a network

pub mod backend;
pub mod content;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod message;
pub mod reconcile;
pub mod tools;
pub mod transcript;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use backend::{ModelBackend, TurnChunk, TurnStream};
pub use content::{Part, ResultEnvelope, ToolCall, ToolResult, TurnContent, TurnRole};
pub use engine::{ConversationEngine, ConversationReport, MAX_TURNS};
pub use error::{EngineError, Result};
pub use events::{EventSink, FinishReason, StreamEvent};
pub use executor::{TurnExecutor, TurnOutcome};
pub use message::{Message, MessagePart, MessageRole};
pub use reconcile::{reconcile, Reconciled, TextAccumulator};
pub use tools::{
    CatalogEntry, CurrentTimeTool, EchoTool, FailingTool, Tool, ToolDeclaration, ToolOutcome,
    ToolRegistry, ToolRegistryBuilder,
};
pub use transcript::adapt_messages;
