// Error types for the conversation engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while driving a conversation
#[derive(Debug, Error)]
pub enum EngineError {
    /// Model backend error (request failed, stream broke mid-turn)
    #[error("Model backend error: {0}")]
    Backend(String),

    /// Tool execution error that could not be folded into a result envelope
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Configuration error (e.g. a tool without a usable declaration)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Event emission error (output channel gone)
    #[error("Event emission error: {0}")]
    EventEmission(String),

    /// The adapted conversation contained no usable messages
    #[error("No messages to process")]
    EmptyConversation,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        EngineError::Backend(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        EngineError::ToolExecution(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    /// Create an event emission error
    pub fn emission(msg: impl Into<String>) -> Self {
        EngineError::EventEmission(msg.into())
    }
}
