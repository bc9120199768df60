//! Deployment attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::failure::{excerpt, EXCERPT_MAX_CHARS};
use crate::signature::ErrorSignature;

/// Result of one push to the hosting platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Ready,
    /// Network/timeout class failure
    TransientError,
    /// Build failure reported by the platform
    ContentError,
}

/// One deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentAttempt {
    /// 1-based attempt number
    pub number: u32,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<ErrorSignature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

impl DeploymentAttempt {
    pub fn ready(number: u32, deployment_id: Option<String>) -> Self {
        Self {
            number,
            status: AttemptStatus::Ready,
            error_excerpt: None,
            signature: None,
            deployment_id,
        }
    }

    pub fn transient(number: u32, error: &str) -> Self {
        Self {
            number,
            status: AttemptStatus::TransientError,
            error_excerpt: Some(excerpt(error, EXCERPT_MAX_CHARS)),
            signature: None,
            deployment_id: None,
        }
    }

    pub fn content(number: u32, error: &str, signature: ErrorSignature) -> Self {
        Self {
            number,
            status: AttemptStatus::ContentError,
            error_excerpt: Some(excerpt(error, EXCERPT_MAX_CHARS)),
            signature: Some(signature),
            deployment_id: None,
        }
    }

    pub fn with_deployment_id(mut self, id: impl Into<String>) -> Self {
        self.deployment_id = Some(id.into());
        self
    }
}

/// Persisted record of a successful deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub project_id: String,
    pub deployment_id: String,
    pub url: String,
    pub attempts: u32,
    /// Outputs of the prerequisite phase (e.g. addresses), if one ran
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub prerequisites: serde_json::Value,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(
        project_id: impl Into<String>,
        deployment_id: impl Into<String>,
        url: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            deployment_id: deployment_id.into(),
            url: url.into(),
            attempts,
            prerequisites: serde_json::Value::Null,
            deployed_at: Utc::now(),
        }
    }
}
