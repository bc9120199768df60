//! Run command - Execute a generation job end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use tracing::info;

use shipwright_core::{GenerationJob, JobKind, JobStatus, JobStore, ShipwrightConfig};
use shipwright_deploy::create_platform;
use shipwright_llm::GenerationGateway;
use shipwright_pipeline::{create_notifier, Collaborators, FileStore, JobController, NOTIFY_URL_ENV};
use shipwright_runner::create_runner;
use shipwright_templates::create_source;

use super::{print_json, CommandFailure};

#[derive(Args)]
pub struct RunArgs {
    /// JSON file describing the job
    #[arg(short, long)]
    job: PathBuf,
}

/// Job description accepted on the command line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default = "default_kind")]
    pub kind: JobKind,
    pub prompt: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

fn default_user() -> String {
    "local".to_string()
}

fn default_kind() -> JobKind {
    JobKind::Initial
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid job file {}", path.display()))
    }

    pub fn into_job(self) -> GenerationJob {
        let id = self
            .id
            .unwrap_or_else(|| format!("job_{}", uuid::Uuid::new_v4().simple()));
        let mut job = GenerationJob::new(id, self.user_id, self.kind, self.prompt)
            .with_context(self.context);
        if let Some(project_id) = self.project_id {
            job = job.with_project(project_id);
        }
        job
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let config = ShipwrightConfig::discover(config_path).context("Failed to load configuration")?;
    let job = JobFile::load(&args.job)?.into_job();
    let job_id = job.id.clone();
    info!(job_id = %job_id, kind = ?job.kind, "Submitting job");

    let store = Arc::new(FileStore::from_config(&config.store));
    store.insert_job(&job).context("Failed to store job")?;

    let gateway = GenerationGateway::from_config(&config.generation)
        .context("Failed to configure the generation service")?;
    let runner = create_runner(&config.build)
        .await
        .context("Failed to create build runner")?;
    let templates = create_source(&config.templates).context("Failed to create template source")?;
    let platform = create_platform(&config.deploy).context("Failed to create deployment client")?;
    let notifier = create_notifier(std::env::var(NOTIFY_URL_ENV).ok().as_deref())
        .context("Failed to create notifier")?;

    let controller = JobController::new(
        Collaborators {
            jobs: store.clone(),
            projects: store.clone(),
            templates,
            gateway: Arc::new(gateway),
            runner,
            platform,
            notifier,
        },
        config,
    );

    let status = controller.execute(&job_id).await?;
    let finished = store.get_job(&job_id).await?;
    print_json(&finished)?;

    if status != JobStatus::Completed {
        return Err(CommandFailure::JobFailed {
            job_id,
            status: status.to_string(),
        }
        .into());
    }
    println!("Job {} completed", job_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_file_defaults() {
        let file: JobFile = serde_json::from_str(r#"{ "prompt": "Build a todo app" }"#).unwrap();
        let job = file.into_job();
        assert!(job.id.starts_with("job_"));
        assert_eq!(job.user_id, "local");
        assert_eq!(job.kind, JobKind::Initial);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_job_file_follow_up() {
        let file: JobFile = serde_json::from_str(
            r#"{
                "id": "job-7",
                "userId": "u1",
                "kind": "follow_up",
                "prompt": "Make it blue",
                "projectId": "proj_1",
                "context": { "skipDeploy": true }
            }"#,
        )
        .unwrap();
        let job = file.into_job();
        assert_eq!(job.id, "job-7");
        assert_eq!(job.project_id.as_deref(), Some("proj_1"));
        assert!(job.context_flag("skipDeploy"));
    }

    #[test]
    fn test_missing_job_file() {
        assert!(JobFile::load(Path::new("/definitely/not/here.json")).is_err());
    }
}
