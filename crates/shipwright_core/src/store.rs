//! Persistence and notification collaborators.
//!
//! The pipeline only talks to storage and users through these traits. An
//! [`InMemoryStore`] covers tests and single-process runs; a file-backed store
//! lives in the pipeline crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deployment::DeploymentRecord;
use crate::error::{CoreError, CoreResult};
use crate::fileset::FileSet;
use crate::job::{GenerationJob, JobStatus};

/// Job persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: &str) -> CoreResult<GenerationJob>;

    /// Update status and payloads. Fails with `InvalidTransition` if the
    /// status change is not allowed.
    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> CoreResult<GenerationJob>;
}

/// Project file persistence.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load_project_files(&self, project_id: &str) -> CoreResult<Option<FileSet>>;

    async fn save_project_files(&self, project_id: &str, files: &FileSet) -> CoreResult<()>;

    async fn save_deployment(&self, record: &DeploymentRecord) -> CoreResult<()>;
}

/// Kind of user notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JobCompleted,
    JobFailed,
}

/// Message sent to a user when a job finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: String,
    pub job_id: String,
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Delivers notifications. Failures are reported but never affect job status.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> CoreResult<()>;
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, notification: &Notification) -> CoreResult<()> {
        debug!(job_id = %notification.job_id, "Notification dropped");
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ProjectEntry {
    files: FileSet,
    touched: Instant,
}

/// In-memory job and project store with TTL eviction of idle projects.
#[derive(Clone)]
pub struct InMemoryStore {
    jobs: Arc<RwLock<HashMap<String, GenerationJob>>>,
    projects: Arc<RwLock<HashMap<String, ProjectEntry>>>,
    deployments: Arc<RwLock<Vec<DeploymentRecord>>>,
    ttl: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl InMemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            projects: Arc::new(RwLock::new(HashMap::new())),
            deployments: Arc::new(RwLock::new(Vec::new())),
            ttl,
        }
    }

    pub fn insert_job(&self, job: GenerationJob) {
        self.jobs.write().insert(job.id.clone(), job);
    }

    pub fn job(&self, job_id: &str) -> Option<GenerationJob> {
        self.jobs.read().get(job_id).cloned()
    }

    pub fn project_files(&self, project_id: &str) -> Option<FileSet> {
        self.projects.read().get(project_id).map(|e| e.files.clone())
    }

    pub fn deployments(&self) -> Vec<DeploymentRecord> {
        self.deployments.read().clone()
    }

    pub fn project_count(&self) -> usize {
        self.projects.read().len()
    }

    /// Drop project entries idle longer than the TTL. Returns how many went.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut projects = self.projects.write();
        let before = projects.len();
        projects.retain(|_, entry| entry.touched.elapsed() < ttl);
        let evicted = before - projects.len();
        if evicted > 0 {
            info!("Evicted {} idle project(s)", evicted);
        }
        evicted
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn get_job(&self, job_id: &str) -> CoreResult<GenerationJob> {
        self.job(job_id)
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> CoreResult<GenerationJob> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;
        apply_status_update(job, status, result, error)?;
        Ok(job.clone())
    }
}

/// Apply a status update to a job, enforcing the transition rules.
pub fn apply_status_update(
    job: &mut GenerationJob,
    status: JobStatus,
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
) -> CoreResult<()> {
    if !job.status.can_transition_to(status) {
        return Err(CoreError::InvalidTransition {
            job_id: job.id.clone(),
            from: job.status,
            to: status,
        });
    }
    job.status = status;
    if result.is_some() {
        job.result = result;
    }
    if error.is_some() {
        job.error = error;
    }
    job.updated_at = Utc::now();
    Ok(())
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn load_project_files(&self, project_id: &str) -> CoreResult<Option<FileSet>> {
        let mut projects = self.projects.write();
        Ok(projects.get_mut(project_id).map(|entry| {
            entry.touched = Instant::now();
            entry.files.clone()
        }))
    }

    async fn save_project_files(&self, project_id: &str, files: &FileSet) -> CoreResult<()> {
        self.projects.write().insert(
            project_id.to_string(),
            ProjectEntry {
                files: files.clone(),
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> CoreResult<()> {
        self.deployments.write().push(record.clone());
        Ok(())
    }
}
