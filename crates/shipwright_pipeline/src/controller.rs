//! Job Controller.
//!
//! The top-level state machine for one job:
//!
//! ```text
//!   pending ─▶ processing ─▶ template fetch | project load
//!                          ─▶ generation            (checkpoint: generated)
//!                          ─▶ build validation      (checkpoint: validated)
//!                          ─▶ deployment
//!                          ─▶ completed | failed ─▶ notification
//! ```
//!
//! The controller is the only writer of job status. Whatever happens inside
//! the stages, a job that was picked up ends in a terminal state.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};

use shipwright_core::{
    Diagnostic, FailureKind, FileSet, GenerationJob, JobCheckpoint, JobErrorPayload, JobKind,
    JobOutcome, JobStage, JobStatus, JobStore, ModelTier, Notification, NotificationKind,
    Notifier, Phase, ProjectStore, ShipwrightConfig,
};
use shipwright_deploy::{DeploymentOrchestrator, DeploymentPlatform, PrerequisiteDeployer};
use shipwright_llm::{build_generation_prompt, generation_system_prompt, GenerationGateway, Patch};
use shipwright_runner::BuildRunner;
use shipwright_templates::{fetch_template, TemplateSource};

use crate::error::{PipelineError, PipelineResult};
use crate::validator::BuildValidator;

/// Job context key selecting the template for initial jobs.
pub const CONTEXT_TEMPLATE: &str = "template";
/// Job context flag that stops the pipeline after build validation.
pub const CONTEXT_SKIP_DEPLOY: &str = "skipDeploy";

/// External collaborators of the controller.
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub templates: Arc<dyn TemplateSource>,
    pub gateway: Arc<GenerationGateway>,
    pub runner: Arc<dyn BuildRunner>,
    pub platform: Arc<dyn DeploymentPlatform>,
    pub notifier: Arc<dyn Notifier>,
}

/// How far the current execution got.
#[derive(Debug, Default)]
struct Progress {
    stage: Option<JobStage>,
    project_id: Option<String>,
}

/// Status, payloads and notification data for the terminal write.
struct Terminal {
    status: JobStatus,
    result: Option<Value>,
    error: Option<Value>,
    url: Option<String>,
}

/// Executes generation jobs end to end.
pub struct JobController {
    jobs: Arc<dyn JobStore>,
    projects: Arc<dyn ProjectStore>,
    templates: Arc<dyn TemplateSource>,
    gateway: Arc<GenerationGateway>,
    notifier: Arc<dyn Notifier>,
    validator: BuildValidator,
    deployer: DeploymentOrchestrator,
    config: ShipwrightConfig,
}

impl JobController {
    pub fn new(parts: Collaborators, config: ShipwrightConfig) -> Self {
        let validator = BuildValidator::from_config(parts.runner, &config.build);
        let deployer = DeploymentOrchestrator::new(
            parts.platform,
            parts.gateway.clone(),
            parts.projects.clone(),
            config.deploy.clone(),
        );
        Self {
            jobs: parts.jobs,
            projects: parts.projects,
            templates: parts.templates,
            gateway: parts.gateway,
            notifier: parts.notifier,
            validator,
            deployer,
            config,
        }
    }

    /// Enable the prerequisite deployment phase.
    pub fn with_prerequisites(mut self, deployer: Arc<dyn PrerequisiteDeployer>) -> Self {
        self.deployer = self.deployer.with_prerequisites(deployer);
        self
    }

    pub fn gateway(&self) -> &GenerationGateway {
        &self.gateway
    }

    /// Run a job to a terminal state and return that state.
    ///
    /// Terminal jobs are left untouched. A `processing` job resumes from its
    /// checkpoint. `Err` is returned only when the job cannot be loaded or
    /// its status cannot be written.
    pub async fn execute(&self, job_id: &str) -> PipelineResult<JobStatus> {
        let span = info_span!("job", job_id = %job_id);
        self.execute_job(job_id).instrument(span).await
    }

    async fn execute_job(&self, job_id: &str) -> PipelineResult<JobStatus> {
        let job = self.jobs.get_job(job_id).await?;
        if job.status.is_terminal() {
            info!(status = %job.status, "Job already finished");
            return Ok(job.status);
        }

        let checkpoint = job.checkpoint();
        if job.status == JobStatus::Pending {
            self.jobs
                .update_job_status(job_id, JobStatus::Processing, None, None)
                .await?;
        }
        info!(
            kind = ?job.kind,
            resume_from = ?checkpoint.as_ref().map(|c| c.stage),
            "Executing job"
        );

        let usage_mark = self.gateway.ledger().len();
        let mut progress = Progress::default();
        let run = self.run(&job, checkpoint, &mut progress, usage_mark).await;
        let terminal = self.terminal(run, &progress);

        if let Err(e) = self
            .jobs
            .update_job_status(job_id, terminal.status, terminal.result, terminal.error)
            .await
        {
            error!("Failed to record terminal status {}: {}", terminal.status, e);
            return Err(e.into());
        }
        info!(status = %terminal.status, "Job finished");

        self.notify(&job, terminal.status, progress.project_id, terminal.url)
            .await;
        Ok(terminal.status)
    }

    async fn run(
        &self,
        job: &GenerationJob,
        checkpoint: Option<JobCheckpoint>,
        progress: &mut Progress,
        usage_mark: usize,
    ) -> PipelineResult<JobOutcome> {
        let project_id = match (&checkpoint, &job.project_id, job.kind) {
            (Some(cp), _, _) => cp.project_id.clone(),
            (None, Some(id), _) => id.clone(),
            (None, None, JobKind::Initial) => format!("proj_{}", uuid::Uuid::new_v4().simple()),
            (None, None, JobKind::FollowUp) => {
                return Err(PipelineError::MissingProject(job.id.clone()))
            }
        };
        progress.project_id = Some(project_id.clone());
        progress.stage = checkpoint.as_ref().map(|c| c.stage);
        if checkpoint.is_none() {
            self.checkpoint(&job.id, JobStage::Started, &project_id, progress)
                .await?;
        }

        let resume_stage = progress.stage.filter(|s| *s >= JobStage::Generated);
        let mut command = self.validator.command().clone();

        let files = match resume_stage {
            Some(stage) => {
                info!(stage = ?stage, "Resuming from persisted files");
                self.load_files(&project_id).await?
            }
            None => {
                let base = match job.kind {
                    JobKind::Initial => {
                        let template_id = job
                            .context_str(CONTEXT_TEMPLATE)
                            .unwrap_or(self.config.templates.default_template.as_str());
                        let bundle = fetch_template(self.templates.as_ref(), template_id).await?;
                        if let Some(build) = bundle.manifest.build {
                            command.build = build;
                        }
                        if let Some(install) = bundle.manifest.install {
                            command.install = Some(install);
                        }
                        bundle.files
                    }
                    JobKind::FollowUp => self.load_files(&project_id).await?,
                };
                let files = self.generate(job, &base).await?;
                self.projects.save_project_files(&project_id, &files).await?;
                self.checkpoint(&job.id, JobStage::Generated, &project_id, progress)
                    .await?;
                files
            }
        };

        let mut validation = None;
        let files = if resume_stage.map_or(true, |s| s < JobStage::Validated) {
            let mut outcome = self
                .validator
                .validate_with(&command, files, &self.gateway, self.config.build.max_iterations)
                .await?;
            if !outcome.success {
                warn!(
                    iterations = outcome.iterations,
                    "Build validation failed; deploying best-effort files"
                );
            }
            let files = std::mem::take(&mut outcome.files);
            self.projects.save_project_files(&project_id, &files).await?;
            self.checkpoint(&job.id, JobStage::Validated, &project_id, progress)
                .await?;
            validation = Some(outcome);
            files
        } else {
            files
        };
        let build_iterations = validation.as_ref().map_or(0, |v| v.iterations);

        if job.context_flag(CONTEXT_SKIP_DEPLOY) {
            info!("Deployment skipped by job context");
            let (success, diagnostic) = match validation {
                Some(v) => (v.success, v.diagnostic),
                None => (true, None),
            };
            return Ok(JobOutcome {
                success,
                project_id,
                files,
                deployed_url: None,
                attempts: 0,
                build_iterations,
                stuck: diagnostic
                    .as_ref()
                    .map_or(false, |d| d.kind == FailureKind::Stuck),
                diagnostic,
                usage: self.gateway.ledger().totals_since(usage_mark),
            });
        }

        let deployed = self.deployer.deploy(&project_id, files).await?;
        self.projects
            .save_project_files(&project_id, &deployed.files)
            .await?;
        if deployed.success {
            progress.stage = Some(JobStage::Deployed);
        }

        Ok(JobOutcome {
            success: deployed.success,
            project_id,
            files: deployed.files,
            deployed_url: deployed.deployed_url,
            attempts: deployed.attempts,
            build_iterations,
            stuck: deployed.stuck,
            diagnostic: deployed.diagnostic,
            usage: self.gateway.ledger().totals_since(usage_mark),
        })
    }

    async fn load_files(&self, project_id: &str) -> PipelineResult<FileSet> {
        self.projects
            .load_project_files(project_id)
            .await?
            .ok_or_else(|| PipelineError::MissingFiles(project_id.to_string()))
    }

    /// Ask the gateway for the project changes and apply them to `base`.
    async fn generate(&self, job: &GenerationJob, base: &FileSet) -> PipelineResult<FileSet> {
        let prompt = build_generation_prompt(job.kind, &job.prompt, base, &job.conversation());
        let response = self
            .gateway
            .complete_for("generate", &generation_system_prompt(), &prompt, ModelTier::Primary)
            .await?;
        let patch =
            Patch::parse(&response).map_err(|e| PipelineError::EmptyGeneration(e.to_string()))?;

        let report = patch.apply(base);
        for note in &report.notes {
            warn!(file = %note.file, kind = ?note.kind, "{}", note.message);
        }
        if report.changed.is_empty() {
            warn!("Generation left every file unchanged");
        }
        info!(
            changed = report.changed.len(),
            files = report.files.len(),
            "Generation applied"
        );
        Ok(report.files)
    }

    async fn checkpoint(
        &self,
        job_id: &str,
        stage: JobStage,
        project_id: &str,
        progress: &mut Progress,
    ) -> PipelineResult<()> {
        let checkpoint = JobCheckpoint::new(stage, project_id);
        self.jobs
            .update_job_status(
                job_id,
                JobStatus::Processing,
                Some(checkpoint.to_payload()),
                None,
            )
            .await?;
        progress.stage = Some(stage);
        debug!(stage = ?stage, "Checkpoint written");
        Ok(())
    }

    /// Turn the run result into the terminal status write.
    fn terminal(&self, run: PipelineResult<JobOutcome>, progress: &Progress) -> Terminal {
        match run {
            Ok(outcome) => {
                let status = if outcome.success {
                    JobStatus::Completed
                } else {
                    JobStatus::Failed
                };
                let error = (!outcome.success).then(|| JobErrorPayload {
                    message: outcome
                        .diagnostic
                        .as_ref()
                        .map(describe)
                        .unwrap_or_else(|| "Job did not succeed".to_string()),
                    stage: progress.stage,
                    diagnostic: outcome.diagnostic.clone(),
                });
                match serde_json::to_value(&outcome) {
                    Ok(result) => Terminal {
                        status,
                        result: Some(result),
                        error: error.and_then(|e| serde_json::to_value(e).ok()),
                        url: outcome.deployed_url,
                    },
                    Err(e) => Terminal {
                        status: JobStatus::Failed,
                        result: None,
                        error: Some(json!({ "message": format!("Unserializable result: {}", e) })),
                        url: None,
                    },
                }
            }
            Err(e) => {
                error!(stage = ?progress.stage, "Job failed: {}", e);
                let diagnostic = match &e {
                    PipelineError::EmptyGeneration(_) => Some(Diagnostic::new(
                        FailureKind::PatchParseFailure,
                        Phase::Generation,
                        1,
                    )),
                    PipelineError::Llm(_) => Some(Diagnostic::new(
                        FailureKind::GenerationFailed,
                        Phase::Generation,
                        1,
                    )),
                    _ => None,
                };
                let payload = JobErrorPayload {
                    message: e.to_string(),
                    stage: progress.stage,
                    diagnostic,
                };
                Terminal {
                    status: JobStatus::Failed,
                    result: None,
                    error: Some(
                        serde_json::to_value(&payload)
                            .unwrap_or_else(|_| json!({ "message": e.to_string() })),
                    ),
                    url: None,
                }
            }
        }
    }

    async fn notify(
        &self,
        job: &GenerationJob,
        status: JobStatus,
        project_id: Option<String>,
        url: Option<String>,
    ) {
        let notification = Notification {
            user_id: job.user_id.clone(),
            job_id: job.id.clone(),
            kind: if status == JobStatus::Completed {
                NotificationKind::JobCompleted
            } else {
                NotificationKind::JobFailed
            },
            project_id,
            url,
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!("Notification failed: {}", e);
        }
    }
}

/// One-line description of why a job did not succeed.
fn describe(diagnostic: &Diagnostic) -> String {
    let phase = match diagnostic.phase {
        Phase::Generation => "generation",
        Phase::Build => "build",
        Phase::Prerequisite => "prerequisite deployment",
        Phase::Deploy => "deployment",
    };
    match diagnostic.kind {
        FailureKind::Stuck => format!(
            "{} stuck on the same error after {} attempt(s)",
            phase, diagnostic.attempts
        ),
        FailureKind::ExhaustedRetries => {
            format!("{} failed after {} attempt(s)", phase, diagnostic.attempts)
        }
        FailureKind::GenerationFailed => format!("generation service failed during {}", phase),
        kind => format!("{} failed: {}", phase, kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let stuck = Diagnostic::new(FailureKind::Stuck, Phase::Deploy, 3);
        assert_eq!(
            describe(&stuck),
            "deployment stuck on the same error after 3 attempt(s)"
        );
        let exhausted = Diagnostic::new(FailureKind::ExhaustedRetries, Phase::Build, 3);
        assert_eq!(describe(&exhausted), "build failed after 3 attempt(s)");
    }
}
