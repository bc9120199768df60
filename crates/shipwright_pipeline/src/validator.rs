//! Build Validator Loop.
//!
//! Writes the candidate file set to a scratch workspace, runs the local build
//! and feeds failures back through the generation gateway until the build
//! passes, the same error repeats, or the iteration budget runs out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use shipwright_core::{
    AttemptOutcome, BuildConfig, Diagnostic, ErrorParser, ErrorSignature, FailureKind, FileSet,
    LoopState, Phase, RetryMachine, RetryPolicy,
};
use shipwright_llm::{request_fix, FixOutcome, GenerationGateway};
use shipwright_runner::{BuildCommand, BuildRunner, ScratchWorkspace};

use crate::error::PipelineResult;

/// Result of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// File set after the last iteration, fixes included
    #[serde(skip)]
    pub files: FileSet,
    pub success: bool,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

/// Runs the local build-fix loop.
pub struct BuildValidator {
    runner: Arc<dyn BuildRunner>,
    command: BuildCommand,
    stuck_threshold: u32,
}

impl BuildValidator {
    pub fn new(runner: Arc<dyn BuildRunner>, command: BuildCommand) -> Self {
        Self {
            runner,
            command,
            stuck_threshold: RetryPolicy::build().stuck_threshold,
        }
    }

    pub fn from_config(runner: Arc<dyn BuildRunner>, config: &BuildConfig) -> Self {
        Self::new(runner, BuildCommand::from_config(config))
            .with_stuck_threshold(config.stuck_threshold)
    }

    pub fn with_stuck_threshold(mut self, threshold: u32) -> Self {
        self.stuck_threshold = threshold;
        self
    }

    pub fn command(&self) -> &BuildCommand {
        &self.command
    }

    /// Validate with the configured build command.
    pub async fn validate(
        &self,
        files: FileSet,
        gateway: &GenerationGateway,
        max_iterations: u32,
    ) -> PipelineResult<ValidationOutcome> {
        self.validate_with(&self.command, files, gateway, max_iterations)
            .await
    }

    /// Validate with an explicit build command.
    ///
    /// Never runs more than `max_iterations` builds. Runner failures (timeout,
    /// missing runtime) use up an iteration without asking for a fix.
    pub async fn validate_with(
        &self,
        command: &BuildCommand,
        files: FileSet,
        gateway: &GenerationGateway,
        max_iterations: u32,
    ) -> PipelineResult<ValidationOutcome> {
        let workspace = ScratchWorkspace::new()?;
        let parser = workspace_parser(&workspace);
        let mut machine = RetryMachine::new(RetryPolicy::new(max_iterations, self.stuck_threshold));
        let mut files = files;
        let mut last_error: Option<String> = None;

        loop {
            let iteration = machine.begin_attempt()?;
            workspace.write_files(&files)?;
            info!(
                iteration,
                runner = self.runner.name(),
                files = files.len(),
                "Running build: {}",
                command.script()
            );

            match self.runner.run(workspace.path(), command).await {
                Ok(output) if output.success() => {
                    machine.record(AttemptOutcome::Succeeded)?;
                    info!(iteration, duration_ms = output.duration_ms, "Build passed");
                    return Ok(ValidationOutcome {
                        files,
                        success: true,
                        iterations: iteration,
                        last_error,
                        diagnostic: None,
                    });
                }
                Ok(output) => {
                    let parsed = parser.parse_failed(&output.stdout, &output.stderr);
                    let signature = ErrorSignature::from_raw(&parsed.summary);
                    let state = machine.record(AttemptOutcome::ContentFailure(signature))?;
                    warn!(
                        iteration,
                        exit_code = output.exit_code,
                        errors = parsed.errors.len(),
                        streak = machine.streak(),
                        state = ?state,
                        "Build failed"
                    );
                    last_error = Some(parsed.summary.clone());

                    if state == LoopState::FixingContent {
                        match request_fix(gateway, &files, &parsed, Phase::Build).await {
                            Ok(FixOutcome::Applied(report)) => {
                                debug!(
                                    iteration,
                                    changed = report.changed.len(),
                                    "Fix applied"
                                );
                                files = report.files;
                            }
                            Ok(FixOutcome::Unparseable(message)) => {
                                warn!(
                                    iteration,
                                    kind = %FailureKind::PatchParseFailure,
                                    "Fix ignored: {}",
                                    message
                                );
                            }
                            Err(e) => {
                                error!(iteration, "Fix request failed: {}", e);
                                let diagnostic = Diagnostic::new(
                                    FailureKind::GenerationFailed,
                                    Phase::Build,
                                    iteration,
                                )
                                .with_last_error(&e.to_string());
                                return Ok(ValidationOutcome {
                                    files,
                                    success: false,
                                    iterations: iteration,
                                    last_error,
                                    diagnostic: Some(diagnostic),
                                });
                            }
                        }
                    }
                }
                Err(e) if e.is_infrastructure() => {
                    warn!(
                        iteration,
                        kind = %FailureKind::TransientInfra,
                        "Build could not run: {}",
                        e
                    );
                    last_error = Some(e.to_string());
                    machine.record(AttemptOutcome::TransientFailure)?;
                }
                Err(e) => return Err(e.into()),
            }

            let reason = last_error.as_deref().unwrap_or_default();
            if let Some(diagnostic) = machine.stop_diagnostic(Phase::Build, reason) {
                warn!(
                    iterations = machine.attempts(),
                    kind = %diagnostic.kind,
                    "Build validation gave up"
                );
                return Ok(ValidationOutcome {
                    files,
                    success: false,
                    iterations: machine.attempts(),
                    last_error,
                    diagnostic: Some(diagnostic),
                });
            }
        }
    }
}

/// Parser reporting paths relative to the scratch workspace.
fn workspace_parser(workspace: &ScratchWorkspace) -> ErrorParser {
    let root = workspace.path();
    let mut parser = ErrorParser::new().strip_prefix(root.to_string_lossy());
    // Tools resolve symlinked temp dirs (macOS /var -> /private/var)
    if let Ok(canonical) = root.canonicalize() {
        if canonical != root {
            parser = parser.strip_prefix(canonical.to_string_lossy());
        }
    }
    parser
}
