//! # shipwright_deploy
//!
//! Deployment for Shipwright: the hosting platform client and the
//! self-healing [`DeploymentOrchestrator`].
//!
//! ```text
//!   FileSet ─▶ prerequisites? ─▶ inject outputs ─▶ platform deploy ─▶ ready
//!                                                      │
//!                                  transient ◀─────────┤
//!                                  content ─▶ parse ─▶ signature ─▶ fix ─▶ retry
//!                                                          └─▶ stuck
//! ```

pub mod error;
pub mod http;
pub mod mock;
pub mod orchestrator;
pub mod platform;
pub mod prerequisite;
pub mod transient;

use std::sync::Arc;

use shipwright_core::DeployConfig;

pub use error::{DeployError, DeployResult};
pub use http::{HttpDeploymentPlatform, DEPLOY_TOKEN_ENV};
pub use mock::{MockDeployment, MockPlatform};
pub use orchestrator::{DeployOutcome, DeploymentOrchestrator};
pub use platform::{DeployRequest, DeploymentLogs, DeploymentPlatform, PlatformStatus};
pub use prerequisite::{inject_outputs, prerequisite_files, PrerequisiteDeployer};
pub use transient::TransientClassifier;

/// Create the HTTP platform client from configuration.
pub fn create_platform(config: &DeployConfig) -> DeployResult<Arc<dyn DeploymentPlatform>> {
    Ok(Arc::new(HttpDeploymentPlatform::from_config(config)?))
}
