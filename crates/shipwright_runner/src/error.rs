//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur during runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Container runtime not available: {0}")]
    RuntimeNotAvailable(String),

    #[error("Build execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Build timeout after {0} seconds")]
    Timeout(u64),

    #[error("Unsafe path in file set: {0}")]
    UnsafePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Infrastructure failures say nothing about the code being built.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, Self::UnsafePath(_))
    }
}
