// Integration tests for the conversation engine
//
// These tests drive the full engine (loop + executor + dispatcher + sink)
// against a scripted backend, covering turn bounds, tool round-trips,
// batch ordering, and mid-stream failure behavior.

use colloquy_core::{
    memory::{RecordingSink, ScriptedBackend, ScriptedTurn, SleepTool},
    ConversationEngine, FinishReason, Message, StreamEvent, ToolCall, ToolRegistry, TurnChunk,
    TurnRole, MAX_TURNS,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn transcript() -> Vec<Message> {
    vec![Message::user("hello there")]
}

// Backends and sinks are Arc-backed, so cloning shares the script and logs;
// tests keep one handle for assertions and give the other to the engine.
fn engine_over(
    backend: ScriptedBackend,
    registry: ToolRegistry,
) -> (
    ConversationEngine<ScriptedBackend, Arc<RecordingSink>>,
    Arc<RecordingSink>,
) {
    let sink = Arc::new(RecordingSink::new());
    let engine = ConversationEngine::new(backend, Arc::clone(&sink), registry);
    (engine, sink)
}

// =============================================================================
// Loop bounds
// =============================================================================

#[tokio::test]
async fn loop_exits_after_one_turn_without_tool_calls() {
    let backend = ScriptedBackend::new();
    backend
        .push_turn(ScriptedTurn::text(&["Hi", " there"]))
        .await;

    let (engine, sink) = engine_over(backend, ToolRegistry::with_defaults());
    let report = engine.run(&transcript()).await.unwrap();

    assert_eq!(report.turns, 1);
    assert_eq!(report.final_text, "Hi there");
    assert_eq!(report.finish_reason, FinishReason::Stop);
    assert_eq!(sink.deltas().await, vec!["Hi", " there"]);
}

#[tokio::test]
async fn loop_stops_at_turn_budget_without_error() {
    let backend = ScriptedBackend::new();
    // Every turn asks for a tool; the loop must stop at MAX_TURNS anyway.
    for _ in 0..MAX_TURNS + 2 {
        backend
            .push_turn(ScriptedTurn::tool_calls(vec![ToolCall::new(
                "echo",
                json!({"message": "again"}),
            )]))
            .await;
    }

    let (engine, _sink) = engine_over(backend, ToolRegistry::with_defaults());
    let report = engine.run(&transcript()).await.unwrap();

    assert_eq!(report.turns, MAX_TURNS);
    assert_eq!(report.finish_reason, FinishReason::Stop);
}

// =============================================================================
// Tool round-trips
// =============================================================================

#[tokio::test]
async fn tool_round_trip_grows_history_and_loop_continues() {
    let backend = ScriptedBackend::new();
    backend
        .push_turns(vec![
            ScriptedTurn::tool_calls(vec![ToolCall::new("echo", json!({"message": "ping"}))]),
            ScriptedTurn::text(&["The tool said ping"]),
        ])
        .await;

    let (engine, _sink) = engine_over(backend.clone(), ToolRegistry::with_defaults());
    let report = engine.run(&transcript()).await.unwrap();

    assert_eq!(report.turns, 2);
    assert_eq!(report.final_text, "The tool said ping");

    // The second backend call saw the model turn and the tool turn.
    let calls = backend.calls().await;
    let second_history = &calls[1];
    assert_eq!(second_history.len(), 3);
    assert_eq!(second_history[1].role, TurnRole::Model);
    assert_eq!(second_history[1].tool_calls().len(), 1);
    assert_eq!(second_history[2].role, TurnRole::Tool);
    let results = second_history[2].tool_results_parts();
    assert_eq!(results.len(), 1);
    assert!(results[0].envelope.ok);
}

#[tokio::test]
async fn unknown_tool_routes_through_model_not_error() {
    let backend = ScriptedBackend::new();
    backend
        .push_turns(vec![
            ScriptedTurn::tool_calls(vec![ToolCall::new("unregistered", json!({}))]),
            ScriptedTurn::text(&["I could not use that tool."]),
        ])
        .await;

    let (engine, _sink) = engine_over(backend.clone(), ToolRegistry::with_defaults());
    let report = engine.run(&transcript()).await.unwrap();

    // The loop proceeded to a second turn instead of terminating.
    assert_eq!(report.turns, 2);
    assert_eq!(report.finish_reason, FinishReason::Stop);

    let calls = backend.calls().await;
    let tool_turn = &calls[1][2];
    let results = tool_turn.tool_results_parts();
    assert_eq!(results[0].name, "unregistered");
    assert!(!results[0].envelope.ok);
    assert_eq!(
        results[0].envelope.error_text.as_deref(),
        Some("Tool not found")
    );
}

#[tokio::test]
async fn concurrent_batch_preserves_call_order() {
    let registry = ToolRegistry::builder()
        .tool(SleepTool::new(
            "slow",
            Duration::from_millis(80),
            json!({"rank": "slow"}),
        ))
        .tool(SleepTool::new(
            "medium",
            Duration::from_millis(40),
            json!({"rank": "medium"}),
        ))
        .tool(SleepTool::new(
            "fast",
            Duration::from_millis(5),
            json!({"rank": "fast"}),
        ))
        .build();

    let calls = vec![
        ToolCall::new("slow", json!({})),
        ToolCall::new("medium", json!({})),
        ToolCall::new("fast", json!({})),
    ];

    let results = registry.dispatch_batch(&calls).await;

    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["slow", "medium", "fast"]);
    assert!(results.iter().all(|r| r.envelope.ok));
}

// =============================================================================
// Stream lifecycle
// =============================================================================

#[tokio::test]
async fn happy_path_emits_full_bracket() {
    let backend = ScriptedBackend::new();
    backend.push_turn(ScriptedTurn::text(&["done"])).await;

    let (engine, sink) = engine_over(backend, ToolRegistry::with_defaults());
    engine.run(&transcript()).await.unwrap();

    assert_eq!(
        sink.event_types().await,
        vec![
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-end",
            "finish-step",
            "finish"
        ]
    );
}

#[tokio::test]
async fn mid_stream_failure_yields_inline_error_and_clean_close() {
    let backend = ScriptedBackend::new();
    backend
        .push_turn(ScriptedTurn::failing_after(
            vec![TurnChunk::text("partial answer")],
            "upstream hung up",
        ))
        .await;

    let (engine, sink) = engine_over(backend, ToolRegistry::with_defaults());
    let report = engine.run(&transcript()).await.unwrap();

    assert_eq!(report.finish_reason, FinishReason::Error);

    // Partial delta, then the inline error delta, then the end bracket.
    let deltas = sink.deltas().await;
    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[0], "partial answer");
    assert!(deltas[1].starts_with("\n[error] "));
    assert!(deltas[1].contains("upstream hung up"));

    let types = sink.event_types().await;
    assert_eq!(
        &types[types.len() - 3..],
        &["text-end", "finish-step", "finish"]
    );
    let last = sink.events().await.into_iter().last().unwrap();
    assert_eq!(
        last,
        StreamEvent::finish(FinishReason::Error)
    );
}

#[tokio::test]
async fn empty_transcript_is_rejected_before_any_event() {
    let backend = ScriptedBackend::new();
    let (engine, sink) = engine_over(backend, ToolRegistry::with_defaults());

    let err = engine.run(&[]).await.unwrap_err();
    assert_eq!(err.to_string(), "No messages to process");
    assert!(sink.events().await.is_empty());
}

#[tokio::test]
async fn all_turn_deltas_share_one_text_block() {
    let backend = ScriptedBackend::new();
    backend
        .push_turns(vec![
            ScriptedTurn::chunks(vec![
                TurnChunk::text("Checking")
                    .with_tool_call(ToolCall::new("echo", json!({"message": "x"}))),
            ]),
            ScriptedTurn::text(&["Checking", "Checking done"]),
        ])
        .await;

    let (engine, sink) = engine_over(backend, ToolRegistry::with_defaults());
    engine.run(&transcript()).await.unwrap();

    let events = sink.events().await;
    let mut ids = events.iter().filter_map(|event| match event {
        StreamEvent::TextStart { id }
        | StreamEvent::TextDelta { id, .. }
        | StreamEvent::TextEnd { id } => Some(id.clone()),
        _ => None,
    });
    let first = ids.next().unwrap();
    assert!(ids.all(|id| id == first));

    // Second turn starts with a fresh accumulator, so its "Checking" is a
    // genuine new increment, not a duplicate of turn one.
    assert_eq!(sink.deltas().await, vec!["Checking", "Checking", " done"]);
}
