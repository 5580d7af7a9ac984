//! Error types for the objattr core library.
//!
//! Uses `thiserror` for public API error types. Attribution failures are contained as
//! close to the failing unit as possible; only configuration errors are meant to abort
//! a process, and only at startup.

/// Top-level error type for the attribution engine.
#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tagger error: {message}")]
    Tagger { message: String },

    #[error("Inference error: {message}")]
    Inference { message: String },

    #[error("Attention tensor shape error: {message}")]
    AttentionShape { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AttributeError {
    pub fn tagger(message: impl Into<String>) -> Self {
        Self::Tagger {
            message: message.into(),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::AttentionShape {
            message: message.into(),
        }
    }
}

/// Errors from the completion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Completion endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {message}")]
    MalformedResponse { message: String },

    #[error("No API key: set `llm.api_key` or the {env_var} environment variable")]
    AuthMissing { env_var: String },
}

impl LlmError {
    /// Whether a retry of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

pub type Result<T> = std::result::Result<T, AttributeError>;
