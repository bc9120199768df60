//! Mock deployment platform for testing.
//!
//! Each `create_deployment` call consumes the next scripted result (cycling
//! when exhausted) and captures the request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{DeployError, DeployResult};
use crate::platform::{DeployRequest, DeploymentLogs, DeploymentPlatform, PlatformStatus};

/// Predefined result of a deployment.
#[derive(Debug, Clone)]
pub enum MockDeployment {
    /// Deployment succeeds at the given URL
    Ready(String),
    /// Platform reports a build failure with this log
    BuildError(String),
    /// `create_deployment` fails with a network error
    Unreachable(String),
    /// `create_deployment` is refused with this HTTP status
    Rejected(u16, String),
    /// Deployment never leaves the building state
    Hang,
}

impl MockDeployment {
    pub fn ready(url: impl Into<String>) -> Self {
        Self::Ready(url.into())
    }

    pub fn build_error(log: impl Into<String>) -> Self {
        Self::BuildError(log.into())
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected(status, message.into())
    }
}

/// Mock deployment platform.
#[derive(Clone, Default)]
pub struct MockPlatform {
    script: Arc<RwLock<Vec<MockDeployment>>>,
    index: Arc<AtomicUsize>,
    deployments: Arc<RwLock<HashMap<String, MockDeployment>>>,
    requests: Arc<RwLock<Vec<DeployRequest>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result for the next deployment.
    pub fn add_deployment(self, deployment: MockDeployment) -> Self {
        self.script.write().push(deployment);
        self
    }

    pub fn with_deployments(self, deployments: Vec<MockDeployment>) -> Self {
        *self.script.write() = deployments;
        self
    }

    /// All captured requests, including ones that failed to reach the platform.
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.read().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.read().len()
    }

    fn next_deployment(&self) -> MockDeployment {
        let script = self.script.read();
        if script.is_empty() {
            return MockDeployment::ready("https://mock.deploy.local");
        }
        let index = self.index.fetch_add(1, Ordering::SeqCst);
        script
            .get(index % script.len())
            .cloned()
            .unwrap_or_else(|| MockDeployment::ready("https://mock.deploy.local"))
    }

    fn lookup(&self, deployment_id: &str) -> DeployResult<MockDeployment> {
        self.deployments
            .read()
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| DeployError::UnknownDeployment(deployment_id.to_string()))
    }
}

#[async_trait]
impl DeploymentPlatform for MockPlatform {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_deployment(&self, request: &DeployRequest) -> DeployResult<String> {
        let number = {
            let mut requests = self.requests.write();
            requests.push(request.clone());
            requests.len()
        };
        let deployment = self.next_deployment();
        match &deployment {
            MockDeployment::Unreachable(message) => {
                return Err(DeployError::Network(message.clone()))
            }
            MockDeployment::Rejected(status, message) => {
                return Err(DeployError::from_status(*status, message.clone()))
            }
            _ => {}
        }
        let id = format!("dpl_{}", number);
        self.deployments.write().insert(id.clone(), deployment);
        Ok(id)
    }

    async fn get_status(&self, deployment_id: &str) -> DeployResult<PlatformStatus> {
        Ok(match self.lookup(deployment_id)? {
            MockDeployment::Ready(url) => PlatformStatus::Ready { url },
            MockDeployment::BuildError(_) => PlatformStatus::Error {
                message: "Build failed".to_string(),
            },
            MockDeployment::Hang | MockDeployment::Unreachable(_) | MockDeployment::Rejected(..) => {
                PlatformStatus::Building
            }
        })
    }

    async fn get_logs(&self, deployment_id: &str) -> DeployResult<DeploymentLogs> {
        Ok(match self.lookup(deployment_id)? {
            MockDeployment::BuildError(log) => DeploymentLogs {
                build_log: String::new(),
                error_log: log,
            },
            _ => DeploymentLogs::default(),
        })
    }
}
