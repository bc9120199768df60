//! Error types for the generation gateway.

use thiserror::Error;

/// Result type alias for generation operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur while talking to a generation service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Generation service overloaded ({status}): {body}")]
    Overloaded { status: u16, body: String },

    #[error("Generation service error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Generation request rejected ({status}): {body}")]
    Client { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("LLM not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unparseable patch response: {0}")]
    PatchParse(String),
}

impl LlmError {
    /// Map an HTTP status and body to an error.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 | 529 => Self::Overloaded { status, body },
            500..=599 => Self::Server { status, body },
            _ => Self::Client { status, body },
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Overloaded { .. } | Self::Server { .. } | Self::Network(_)
        )
    }
}
