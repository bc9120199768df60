//! Deployment Orchestrator.
//!
//! Pushes a file set to the hosting platform and heals content failures
//! through the generation gateway. Every attempt is classified:
//!
//! - ready: return the URL
//! - content failure: the parsed log points at source; compare its signature
//!   with the previous content failure, and either request a fix or stop as
//!   stuck
//! - transient (network, timeout, platform hiccup): no source errors and a
//!   transient marker in the log; retry without a fix
//! - rejected request or credentials: return `Err`
//!
//! Files under the prerequisite directory are deployed first and their
//! outputs injected into the file set before the application deploy.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use shipwright_core::{
    AttemptOutcome, DeployConfig, DeploymentAttempt, DeploymentRecord, Diagnostic, ErrorParser,
    ErrorSignature, FailureKind, FileSet, LoopState, ParseOutcome, Phase, ProjectStore,
    RetryMachine,
};
use shipwright_llm::{request_fix, FixOutcome, GenerationGateway};

use crate::error::{DeployError, DeployResult};
use crate::platform::{DeployRequest, DeploymentLogs, DeploymentPlatform, PlatformStatus};
use crate::prerequisite::{inject_outputs, prerequisite_files, PrerequisiteDeployer};
use crate::transient::TransientClassifier;

/// Result of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    /// Final file set, including applied fixes
    #[serde(skip)]
    pub files: FileSet,
    pub attempts: u32,
    pub stuck: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    pub attempt_log: Vec<DeploymentAttempt>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub prerequisites: Value,
}

impl DeployOutcome {
    fn failed(
        files: FileSet,
        diagnostic: Diagnostic,
        attempt_log: Vec<DeploymentAttempt>,
        prerequisites: Value,
    ) -> Self {
        Self {
            success: false,
            deployed_url: None,
            deployment_id: None,
            files,
            attempts: diagnostic.attempts,
            stuck: diagnostic.kind == FailureKind::Stuck,
            diagnostic: Some(diagnostic),
            attempt_log,
            prerequisites,
        }
    }
}

/// Classified result of a single deployment attempt.
enum AttemptResult {
    Ready { deployment_id: String, url: String },
    Transient(String),
    Failed {
        deployment_id: Option<String>,
        logs: DeploymentLogs,
        parsed: ParseOutcome,
    },
}

enum Healed {
    Files(FileSet),
    GenerationFailed(String),
}

enum PrerequisiteResult {
    Deployed { files: FileSet, outputs: Value },
    Failed(DeployOutcome),
}

/// Drives deployments to a terminal state.
pub struct DeploymentOrchestrator {
    platform: Arc<dyn DeploymentPlatform>,
    gateway: Arc<GenerationGateway>,
    projects: Arc<dyn ProjectStore>,
    prerequisites: Option<Arc<dyn PrerequisiteDeployer>>,
    config: DeployConfig,
    parser: ErrorParser,
    classifier: TransientClassifier,
}

impl DeploymentOrchestrator {
    pub fn new(
        platform: Arc<dyn DeploymentPlatform>,
        gateway: Arc<GenerationGateway>,
        projects: Arc<dyn ProjectStore>,
        config: DeployConfig,
    ) -> Self {
        let classifier = TransientClassifier::new(&config.transient_markers);
        Self {
            platform,
            gateway,
            projects,
            prerequisites: None,
            config,
            parser: ErrorParser::new(),
            classifier,
        }
    }

    /// Enable the prerequisite phase.
    pub fn with_prerequisites(mut self, deployer: Arc<dyn PrerequisiteDeployer>) -> Self {
        self.prerequisites = Some(deployer);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Deploy a project, healing content failures until a terminal state.
    ///
    /// Returns `Err` only for failures no retry can fix (rejected
    /// credentials, requests the platform refuses, persistence errors).
    pub async fn deploy(&self, project_id: &str, files: FileSet) -> DeployResult<DeployOutcome> {
        let mut files = files;
        let mut prerequisites = Value::Null;

        if let Some(deployer) = &self.prerequisites {
            if !prerequisite_files(&files, &self.config.prerequisite_dir).is_empty() {
                match self
                    .run_prerequisites(deployer.as_ref(), project_id, files)
                    .await?
                {
                    PrerequisiteResult::Deployed {
                        files: injected,
                        outputs,
                    } => {
                        files = injected;
                        prerequisites = outputs;
                    }
                    PrerequisiteResult::Failed(outcome) => return Ok(outcome),
                }
            }
        }

        self.deploy_application(project_id, files, prerequisites)
            .await
    }

    async fn run_prerequisites(
        &self,
        deployer: &dyn PrerequisiteDeployer,
        project_id: &str,
        files: FileSet,
    ) -> DeployResult<PrerequisiteResult> {
        let mut machine = RetryMachine::new(self.config.retry_policy());
        let mut files = files;

        loop {
            let attempt = machine.begin_attempt()?;
            let subset = prerequisite_files(&files, &self.config.prerequisite_dir);
            info!(project_id, attempt, files = subset.len(), "Deploying prerequisites");

            let err = match deployer.deploy(project_id, &subset).await {
                Ok(outputs) => {
                    machine.record(AttemptOutcome::Succeeded)?;
                    let files = inject_outputs(&files, &self.config.injection_path, &outputs)?;
                    self.projects.save_project_files(project_id, &files).await?;
                    info!(project_id, attempt, "Prerequisites deployed");
                    return Ok(PrerequisiteResult::Deployed { files, outputs });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };

            let last_error = err.to_string();
            let parsed = self.parser.parse_failed("", &last_error);
            if err.is_transient()
                || (!parsed.has_source_errors() && self.classifier.is_transient(&last_error))
            {
                warn!(project_id, attempt, "Transient prerequisite failure: {}", last_error);
                machine.record(AttemptOutcome::TransientFailure)?;
            } else {
                let signature = ErrorSignature::from_raw(&parsed.summary);
                let state = machine.record(AttemptOutcome::ContentFailure(signature))?;
                warn!(project_id, attempt, state = ?state, "Prerequisite deployment failed");
                if state == LoopState::FixingContent {
                    match self
                        .heal(project_id, &files, &parsed, Phase::Prerequisite)
                        .await?
                    {
                        Healed::Files(fixed) => files = fixed,
                        Healed::GenerationFailed(message) => {
                            let diagnostic = Diagnostic::new(
                                FailureKind::GenerationFailed,
                                Phase::Prerequisite,
                                attempt,
                            )
                            .with_last_error(&message);
                            return Ok(PrerequisiteResult::Failed(DeployOutcome::failed(
                                files,
                                diagnostic,
                                Vec::new(),
                                Value::Null,
                            )));
                        }
                    }
                }
            }

            if let Some(diagnostic) = machine.stop_diagnostic(Phase::Prerequisite, &last_error) {
                error!(project_id, kind = %diagnostic.kind, "Prerequisite phase gave up");
                return Ok(PrerequisiteResult::Failed(DeployOutcome::failed(
                    files,
                    diagnostic,
                    Vec::new(),
                    Value::Null,
                )));
            }
        }
    }

    async fn deploy_application(
        &self,
        project_id: &str,
        files: FileSet,
        prerequisites: Value,
    ) -> DeployResult<DeployOutcome> {
        let mut machine = RetryMachine::new(self.config.retry_policy());
        let mut files = files;
        let mut attempt_log = Vec::new();

        loop {
            let attempt = machine.begin_attempt()?;
            info!(project_id, attempt, platform = self.platform.name(), "Deploying application");
            let request = DeployRequest::new(project_id, files.clone());

            let last_error = match self.attempt(&request).await? {
                AttemptResult::Ready { deployment_id, url } => {
                    machine.record(AttemptOutcome::Succeeded)?;
                    attempt_log.push(DeploymentAttempt::ready(attempt, Some(deployment_id.clone())));

                    let mut record = DeploymentRecord::new(project_id, &deployment_id, &url, attempt);
                    record.prerequisites = prerequisites.clone();
                    self.projects.save_deployment(&record).await?;

                    info!(project_id, attempt, url = %url, "Deployment ready");
                    return Ok(DeployOutcome {
                        success: true,
                        deployed_url: Some(url),
                        deployment_id: Some(deployment_id),
                        files,
                        attempts: attempt,
                        stuck: false,
                        diagnostic: None,
                        attempt_log,
                        prerequisites,
                    });
                }
                AttemptResult::Transient(message) => {
                    warn!(project_id, attempt, "Transient deployment failure: {}", message);
                    attempt_log.push(DeploymentAttempt::transient(attempt, &message));
                    machine.record(AttemptOutcome::TransientFailure)?;
                    message
                }
                AttemptResult::Failed {
                    deployment_id,
                    logs,
                    parsed,
                } => {
                    let signature = ErrorSignature::from_raw(&parsed.summary);
                    let raw = format!("{}\n{}", logs.build_log, logs.error_log);
                    let mut entry = DeploymentAttempt::content(attempt, &raw, signature.clone());
                    if let Some(id) = deployment_id {
                        entry = entry.with_deployment_id(id);
                    }
                    attempt_log.push(entry);

                    let state = machine.record(AttemptOutcome::ContentFailure(signature))?;
                    warn!(
                        project_id,
                        attempt,
                        errors = parsed.errors.len(),
                        streak = machine.streak(),
                        state = ?state,
                        "Deployment failed"
                    );
                    if state == LoopState::FixingContent {
                        match self.heal(project_id, &files, &parsed, Phase::Deploy).await? {
                            Healed::Files(fixed) => files = fixed,
                            Healed::GenerationFailed(message) => {
                                let diagnostic = Diagnostic::new(
                                    FailureKind::GenerationFailed,
                                    Phase::Deploy,
                                    attempt,
                                )
                                .with_last_error(&message);
                                return Ok(DeployOutcome::failed(
                                    files,
                                    diagnostic,
                                    attempt_log,
                                    prerequisites,
                                ));
                            }
                        }
                    }
                    parsed.summary
                }
            };

            if let Some(diagnostic) = machine.stop_diagnostic(Phase::Deploy, &last_error) {
                error!(
                    project_id,
                    attempts = machine.attempts(),
                    kind = %diagnostic.kind,
                    "Deployment gave up"
                );
                return Ok(DeployOutcome::failed(
                    files,
                    diagnostic,
                    attempt_log,
                    prerequisites,
                ));
            }
        }
    }

    /// Push once and poll until the platform reaches a terminal state.
    async fn attempt(&self, request: &DeployRequest) -> DeployResult<AttemptResult> {
        let deployment_id = match self.platform.create_deployment(request).await {
            Ok(id) => id,
            Err(e) => return self.classify_error(None, e),
        };
        debug!(deployment_id = %deployment_id, "Deployment created");

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
        loop {
            match self.platform.get_status(&deployment_id).await {
                Ok(PlatformStatus::Ready { url }) => {
                    return Ok(AttemptResult::Ready { deployment_id, url })
                }
                Ok(PlatformStatus::Error { message }) => {
                    let logs = self.fetch_logs(&deployment_id, message).await;
                    return Ok(self.classify_logs(Some(deployment_id), logs));
                }
                Ok(PlatformStatus::Queued | PlatformStatus::Building) => {}
                Err(e) => return self.classify_error(Some(deployment_id), e),
            }
            if Instant::now() >= deadline {
                return Ok(AttemptResult::Transient(
                    DeployError::Timeout(self.config.timeout_secs).to_string(),
                ));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn fetch_logs(&self, deployment_id: &str, status_message: String) -> DeploymentLogs {
        match self.platform.get_logs(deployment_id).await {
            Ok(logs) if !(logs.build_log.trim().is_empty() && logs.error_log.trim().is_empty()) => {
                logs
            }
            Ok(_) => DeploymentLogs {
                build_log: String::new(),
                error_log: status_message,
            },
            Err(e) => {
                warn!(deployment_id, "Failed to fetch deployment logs: {}", e);
                DeploymentLogs {
                    build_log: String::new(),
                    error_log: status_message,
                }
            }
        }
    }

    fn classify_error(
        &self,
        deployment_id: Option<String>,
        err: DeployError,
    ) -> DeployResult<AttemptResult> {
        if err.is_fatal() {
            return Err(err);
        }
        let message = err.to_string();
        if err.is_transient() {
            return Ok(AttemptResult::Transient(message));
        }
        let logs = DeploymentLogs {
            build_log: String::new(),
            error_log: message,
        };
        Ok(self.classify_logs(deployment_id, logs))
    }

    /// Parse first: a log naming source errors is a content failure even
    /// when it also contains a transient marker (`setTimeout`, an app's own
    /// "Network error" string).
    fn classify_logs(&self, deployment_id: Option<String>, logs: DeploymentLogs) -> AttemptResult {
        let parsed = self.parser.parse_failed(&logs.build_log, &logs.error_log);
        if !parsed.has_source_errors() {
            let raw = format!("{}\n{}", logs.build_log, logs.error_log);
            if self.classifier.is_transient(&raw) {
                return AttemptResult::Transient(raw.trim().to_string());
            }
        }
        AttemptResult::Failed {
            deployment_id,
            logs,
            parsed,
        }
    }

    /// Ask for a fix and persist the result when it changed anything.
    async fn heal(
        &self,
        project_id: &str,
        files: &FileSet,
        parsed: &ParseOutcome,
        phase: Phase,
    ) -> DeployResult<Healed> {
        match request_fix(&self.gateway, files, parsed, phase).await {
            Ok(FixOutcome::Applied(report)) => {
                if !report.changed.is_empty() {
                    self.projects
                        .save_project_files(project_id, &report.files)
                        .await?;
                }
                Ok(Healed::Files(report.files))
            }
            Ok(FixOutcome::Unparseable(message)) => {
                warn!(
                    project_id,
                    kind = %FailureKind::PatchParseFailure,
                    "Fix ignored: {}",
                    message
                );
                Ok(Healed::Files(files.clone()))
            }
            Err(e) => {
                error!(project_id, "Fix request failed: {}", e);
                Ok(Healed::GenerationFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDeployment, MockPlatform};
    use shipwright_core::{GenerationConfig, InMemoryStore};
    use shipwright_llm::{MockCompletionService, MockReply};

    const TS_ERROR: &str =
        "src/app/page.tsx(3,7): error TS2322: Type 'string' is not assignable to type 'number'.";

    fn orchestrator(
        platform: &MockPlatform,
        llm: &MockCompletionService,
        store: &InMemoryStore,
    ) -> DeploymentOrchestrator {
        let gateway = GenerationGateway::new(
            Arc::new(llm.clone()),
            GenerationConfig {
                base_backoff_ms: 0,
                max_backoff_ms: 0,
                ..Default::default()
            },
        );
        DeploymentOrchestrator::new(
            Arc::new(platform.clone()),
            Arc::new(gateway),
            Arc::new(store.clone()),
            DeployConfig {
                poll_interval_ms: 0,
                ..Default::default()
            },
        )
    }

    fn files() -> FileSet {
        FileSet::new().with_file(
            "src/app/page.tsx",
            "const a = 1;\nconst b = 2;\nconst n: number = 'x';\n",
        )
    }

    #[tokio::test]
    async fn test_generation_failure_stops_loop() {
        let platform = MockPlatform::new().add_deployment(MockDeployment::build_error(TS_ERROR));
        let llm = MockCompletionService::new().add_reply(MockReply::status(401));
        let store = InMemoryStore::default();

        let outcome = orchestrator(&platform, &llm, &store)
            .deploy("p1", files())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(!outcome.stuck);
        let diagnostic = outcome.diagnostic.unwrap();
        assert_eq!(diagnostic.kind, FailureKind::GenerationFailed);
        assert_eq!(diagnostic.attempts, 1);
        assert_eq!(platform.request_count(), 1);
        assert_eq!(outcome.files, files());
    }

    #[tokio::test]
    async fn test_hanging_deployment_is_transient() {
        let platform = MockPlatform::new().add_deployment(MockDeployment::Hang);
        let llm = MockCompletionService::new();
        let store = InMemoryStore::default();
        let mut orchestrator = orchestrator(&platform, &llm, &store);
        orchestrator.config.timeout_secs = 0;

        let outcome = orchestrator.deploy("p1", files()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(
            outcome.diagnostic.unwrap().kind,
            FailureKind::ExhaustedRetries
        );
        assert_eq!(llm.call_count(), 0);
        assert!(outcome
            .attempt_log
            .iter()
            .all(|a| a.status == shipwright_core::AttemptStatus::TransientError));
    }

    #[tokio::test]
    async fn test_type_error_mentioning_timeout_is_content_failure() {
        let log = "Failed to compile.\n\n./src/app/page.tsx:3:7\nType error: Argument of type 'string' is not assignable to parameter of type 'number'.\n\n  2 | const b = 2;\n> 3 |   setTimeout(tick, 'soon');\n";
        let platform = MockPlatform::new().add_deployment(MockDeployment::build_error(log));
        let llm = MockCompletionService::new()
            .add_text("### FILE: src/app/page.tsx\n```tsx\nsetTimeout(tick, 1000);\n```\n");
        let store = InMemoryStore::default();

        let outcome = orchestrator(&platform, &llm, &store)
            .deploy("p1", files())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.stuck);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(outcome.diagnostic.unwrap().kind, FailureKind::Stuck);
        assert!(outcome
            .attempt_log
            .iter()
            .all(|a| a.status == shipwright_core::AttemptStatus::ContentError));
    }

    #[tokio::test]
    async fn test_rejected_request_is_fatal() {
        let platform =
            MockPlatform::new().add_deployment(MockDeployment::rejected(413, "payload too large"));
        let llm = MockCompletionService::new();
        let store = InMemoryStore::default();

        let err = orchestrator(&platform, &llm, &store)
            .deploy("p1", files())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Platform { status: 413, .. }));
        assert_eq!(platform.request_count(), 1);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_log_markers_skip_fix() {
        let platform = MockPlatform::new().with_deployments(vec![
            MockDeployment::build_error("npm ERR! network request failed: ECONNRESET"),
            MockDeployment::ready("https://p1.example.dev"),
        ]);
        let llm = MockCompletionService::new();
        let store = InMemoryStore::default();

        let outcome = orchestrator(&platform, &llm, &store)
            .deploy("p1", files())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(llm.call_count(), 0);
    }
}
