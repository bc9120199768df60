//! Hosting platform abstraction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shipwright_core::FileSet;

use crate::error::DeployResult;

/// Request to deploy a complete file set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub project_id: String,
    pub files: FileSet,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, serde_json::Value>,
}

impl DeployRequest {
    pub fn new(project_id: impl Into<String>, files: FileSet) -> Self {
        Self {
            project_id: project_id.into(),
            files,
            flags: BTreeMap::new(),
        }
    }

    pub fn flag(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.flags.insert(key.into(), value);
        self
    }
}

/// Current state of a platform deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlatformStatus {
    Queued,
    Building,
    Ready { url: String },
    Error { message: String },
}

impl PlatformStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready { .. } | Self::Error { .. })
    }
}

/// Logs of a finished deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentLogs {
    #[serde(default)]
    pub build_log: String,
    #[serde(default)]
    pub error_log: String,
}

/// A hosting platform that builds and serves projects.
#[async_trait]
pub trait DeploymentPlatform: Send + Sync {
    /// Platform name for logs.
    fn name(&self) -> &str;

    /// Start a deployment and return its id.
    async fn create_deployment(&self, request: &DeployRequest) -> DeployResult<String>;

    async fn get_status(&self, deployment_id: &str) -> DeployResult<PlatformStatus>;

    async fn get_logs(&self, deployment_id: &str) -> DeployResult<DeploymentLogs>;
}
