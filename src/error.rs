//! Error types for the Panacloud agents runtime

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, AgentsError>;

/// Main error type for agent runs, configuration and chat surfaces
#[derive(Debug, Error)]
pub enum AgentsError {
    /// Error from the chat-completions API
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    /// The provider API key is not present in the environment
    #[error("Missing API key: environment variable {var} is not set")]
    MissingApiKey { var: String },

    /// Maximum turns exceeded
    #[error("Maximum turns exceeded: {max_turns}")]
    MaxTurnsExceeded { max_turns: usize },

    /// Tool execution error
    #[error("Tool execution error: {message}")]
    ToolExecutionError { message: String },

    /// Handoff error
    #[error("Handoff error: {message}")]
    HandoffError { message: String },

    /// Model behavior error
    #[error("Model behavior error: {message}")]
    ModelBehaviorError { message: String },

    /// User error
    #[error("User error: {message}")]
    UserError { message: String },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Config file parse error
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
