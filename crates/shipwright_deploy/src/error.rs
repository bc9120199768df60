//! Error types for deployment.

use thiserror::Error;

use shipwright_core::CoreError;

/// Result type alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors raised by platform clients and the orchestrator.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Platform returned {status}: {message}")]
    Platform { status: u16, message: String },

    #[error("Platform rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Deployment timed out after {0}s")]
    Timeout(u64),

    #[error("Unknown deployment: {0}")]
    UnknownDeployment(String),

    #[error("Prerequisite deployment failed: {0}")]
    Prerequisite(String),

    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Map an HTTP status and body to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            _ => Self::Platform {
                status,
                message: message.into(),
            },
        }
    }

    /// Infrastructure failures that are retried without a fix.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::UnknownDeployment(_) => true,
            Self::Platform { status, .. } => matches!(*status, 408 | 429) || *status >= 500,
            _ => false,
        }
    }

    /// Failures no retry or fix can resolve: rejected credentials, requests
    /// the platform refuses as malformed, and local persistence errors.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Unauthorized { .. } | Self::Core(_) | Self::Json(_) => true,
            Self::InvalidResponse(_) => true,
            Self::Platform { status, .. } => (400..500).contains(status) && !self.is_transient(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Network(format!("request timed out: {}", err));
        }
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DeployError::from_status(503, "unavailable").is_transient());
        assert!(DeployError::from_status(429, "slow down").is_transient());
        assert!(!DeployError::from_status(400, "bad files").is_transient());
        assert!(DeployError::from_status(400, "bad files").is_fatal());
        assert!(DeployError::from_status(413, "too large").is_fatal());
        assert!(DeployError::from_status(408, "request timeout").is_transient());
        assert!(!DeployError::from_status(429, "slow down").is_fatal());
        assert!(!DeployError::from_status(502, "bad gateway").is_fatal());
        assert!(DeployError::InvalidResponse("not json".into()).is_fatal());
        assert!(DeployError::from_status(401, "").is_fatal());
        assert!(DeployError::Timeout(600).is_transient());
        assert!(!DeployError::Prerequisite("revert".into()).is_fatal());
    }
}
