// Tool abstraction and dispatch
//
// Tools are defined via the `Tool` trait and registered with a
// `ToolRegistry`. The registry is both the catalog (formatting entries into
// backend declarations) and the dispatcher (resolving calls by name and
// executing batches).
//
// Design decisions:
// - A catalog entry is a sum type: either a declaration already in backend
//   form, or a handler whose declaration is extracted once at formatting time
// - An entry without a usable description fails catalog formatting, before
//   any turn runs
// - Dispatch never fails the surrounding loop: unresolvable names and
//   invocation failures (including panics) become failure envelopes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::content::{ResultEnvelope, ToolCall, ToolResult};
use crate::error::{EngineError, Result};

// ============================================================================
// Tool Trait
// ============================================================================

/// Outcome of a single tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Successful execution with a JSON payload
    Success(Value),
    /// Failed execution; the text is fed back to the model
    Error(String),
}

impl ToolOutcome {
    pub fn success(payload: impl Into<Value>) -> Self {
        ToolOutcome::Success(payload.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolOutcome::Error(message.into())
    }

    /// Fold into the uniform result envelope
    pub fn into_envelope(self) -> ResultEnvelope {
        match self {
            ToolOutcome::Success(payload) => ResultEnvelope::success(payload),
            ToolOutcome::Error(message) => ResultEnvelope::failure(message),
        }
    }
}

/// Trait for tools the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry; the model uses it to invoke the tool
    fn name(&self) -> &str;

    /// Description provided to the model. Must be non-empty; the catalog
    /// refuses to format a tool without one.
    fn description(&self) -> &str;

    /// JSON schema of the tool's arguments
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: Value) -> ToolOutcome;
}

// ============================================================================
// Catalog - Declarations for the Model Backend
// ============================================================================

/// A tool declaration in the form the model backend consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One catalog entry: either a declaration supplied verbatim, or a handler
/// the declaration is extracted from.
///
/// The two representations are resolved exactly once, when the catalog is
/// formatted for the backend.
#[derive(Clone)]
pub enum CatalogEntry {
    /// Already in backend declaration form (no invocable handler)
    Declared(ToolDeclaration),
    /// A registered handler; declaration is derived from the trait
    Handler(Arc<dyn Tool>),
}

impl CatalogEntry {
    /// The name this entry answers to
    pub fn name(&self) -> &str {
        match self {
            CatalogEntry::Declared(decl) => &decl.name,
            CatalogEntry::Handler(tool) => tool.name(),
        }
    }

    /// Resolve this entry into a backend declaration.
    ///
    /// Fails with a configuration error when the description is empty;
    /// a tool the model cannot understand is a setup bug, not something
    /// to degrade around silently.
    pub fn declaration(&self) -> Result<ToolDeclaration> {
        let declaration = match self {
            CatalogEntry::Declared(decl) => decl.clone(),
            CatalogEntry::Handler(tool) => ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            },
        };

        if declaration.description.trim().is_empty() {
            return Err(EngineError::config(format!(
                "Tool '{}' has no usable description",
                declaration.name
            )));
        }

        Ok(declaration)
    }
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogEntry::Declared(decl) => f.debug_tuple("Declared").field(&decl.name).finish(),
            CatalogEntry::Handler(tool) => f.debug_tuple("Handler").field(&tool.name()).finish(),
        }
    }
}

// ============================================================================
// ToolRegistry - Catalog plus Dispatcher
// ============================================================================

/// Registry of tools available to one conversation.
///
/// Entries keep registration order so the formatted catalog is stable.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    entries: Vec<CatalogEntry>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the default built-in tools (`echo`, `current_time`)
    pub fn with_defaults() -> Self {
        ToolRegistry::builder()
            .tool(EchoTool)
            .tool(CurrentTimeTool)
            .build()
    }

    /// Register a handler tool. A same-named entry is replaced.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_entry(CatalogEntry::Handler(Arc::new(tool)));
    }

    /// Register an Arc-wrapped handler tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.register_entry(CatalogEntry::Handler(tool));
    }

    /// Register a pre-formatted declaration (no invocable handler)
    pub fn register_declaration(&mut self, declaration: ToolDeclaration) {
        self.register_entry(CatalogEntry::Declared(declaration));
    }

    fn register_entry(&mut self, entry: CatalogEntry) {
        self.entries.retain(|e| e.name() != entry.name());
        self.entries.push(entry);
    }

    /// Resolve an entry by name
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// Check whether a name is registered
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered names, in registration order
    pub fn tool_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Format the catalog for the model backend.
    ///
    /// Resolves every entry exactly once; an entry without a usable
    /// description fails the whole catalog (configuration error).
    pub fn declarations(&self) -> Result<Vec<ToolDeclaration>> {
        self.entries.iter().map(|e| e.declaration()).collect()
    }

    /// Create a builder for fluent registration
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Execute one tool call, folding every failure mode into the envelope.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let envelope = match self.get(&call.name) {
            Some(CatalogEntry::Handler(tool)) => {
                invoke_caught(Arc::clone(tool), call.arguments.clone()).await
            }
            // Declared-only entries have nothing to run; same as unknown.
            Some(CatalogEntry::Declared(_)) | None => {
                warn!(tool_name = %call.name, "Tool call to unresolvable name");
                ResultEnvelope::not_found()
            }
        };

        ToolResult::new(&call.name, envelope)
    }

    /// Execute a batch of tool calls concurrently.
    ///
    /// Invocations run as independent tasks; results come back in the same
    /// order as the input calls regardless of completion order.
    pub async fn dispatch_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let futures: Vec<_> = calls.iter().map(|call| self.dispatch(call)).collect();
        futures::future::join_all(futures).await
    }
}

/// Run one invocation on its own task so that a panicking tool is contained
/// and stringified instead of tearing down the conversation.
async fn invoke_caught(tool: Arc<dyn Tool>, arguments: Value) -> ResultEnvelope {
    let name = tool.name().to_string();
    let handle = tokio::spawn(async move { tool.execute(arguments).await });

    match handle.await {
        Ok(outcome) => {
            if let ToolOutcome::Error(ref message) = outcome {
                warn!(tool_name = %name, error = %message, "Tool invocation failed");
            }
            outcome.into_envelope()
        }
        Err(join_error) => {
            warn!(tool_name = %name, error = %join_error, "Tool invocation panicked");
            ResultEnvelope::failure(join_error.to_string())
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

// ============================================================================
// ToolRegistryBuilder
// ============================================================================

/// Builder for creating a ToolRegistry with a fluent API
pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
        }
    }

    /// Add a handler tool
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    /// Add a pre-formatted declaration
    pub fn declaration(mut self, declaration: ToolDeclaration) -> Self {
        self.registry.register_declaration(declaration);
        self
    }

    pub fn build(self) -> ToolRegistry {
        self.registry
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Echoes back the provided message (useful for testing)
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided message. Useful for testing tool execution."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, arguments: Value) -> ToolOutcome {
        let message = arguments
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        ToolOutcome::success(serde_json::json!({
            "echoed": message,
            "length": message.len()
        }))
    }
}

/// Returns the current date and time
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time as an RFC 3339 timestamp (UTC)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: Value) -> ToolOutcome {
        ToolOutcome::success(serde_json::json!({
            "current_time": chrono::Utc::now().to_rfc3339()
        }))
    }
}

/// A tool that always fails (useful for testing error handling)
pub struct FailingTool {
    error_message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
        }
    }
}

impl Default for FailingTool {
    fn default() -> Self {
        Self::new("Tool execution failed")
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails (for testing error handling)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: Value) -> ToolOutcome {
        ToolOutcome::error(&self.error_message)
    }
}

// ============================================================================
// Tests
// ============================================================================
