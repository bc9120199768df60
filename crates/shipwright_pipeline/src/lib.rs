//! # shipwright_pipeline
//!
//! Job orchestration for Shipwright.
//!
//! - **Build Validator Loop**: scratch-workspace builds with error-driven fixes
//! - **Job Controller**: template fetch, generation, validation, deployment,
//!   checkpoints and notification for one job
//! - **Persistence**: a JSON file store for jobs, project files and
//!   deployment records
//! - **Notifiers**: log and webhook delivery
//!
//! ```text
//!   GenerationJob ─▶ JobController ─▶ TemplateSource ─▶ GenerationGateway
//!                         │
//!                         ├─▶ BuildValidator ─▶ BuildRunner
//!                         ├─▶ DeploymentOrchestrator ─▶ DeploymentPlatform
//!                         └─▶ JobStore / ProjectStore / Notifier
//! ```

pub mod controller;
pub mod error;
pub mod notify;
pub mod store;
pub mod validator;

use std::sync::Arc;

use shipwright_core::{CoreResult, Notifier};

pub use controller::{Collaborators, JobController, CONTEXT_SKIP_DEPLOY, CONTEXT_TEMPLATE};
pub use error::{PipelineError, PipelineResult};
pub use notify::{HttpNotifier, LogNotifier, NOTIFY_URL_ENV};
pub use store::FileStore;
pub use validator::{BuildValidator, ValidationOutcome};

/// Webhook notifier when a URL is given, log notifier otherwise.
pub fn create_notifier(url: Option<&str>) -> CoreResult<Arc<dyn Notifier>> {
    match url.filter(|u| !u.trim().is_empty()) {
        Some(url) => Ok(Arc::new(HttpNotifier::new(url)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
