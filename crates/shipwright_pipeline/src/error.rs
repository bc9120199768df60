//! Error types for the pipeline.

use thiserror::Error;

use shipwright_core::CoreError;
use shipwright_deploy::DeployError;
use shipwright_llm::LlmError;
use shipwright_runner::RunnerError;
use shipwright_templates::TemplateError;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that end a job outright.
///
/// Loop failures (stuck, exhausted) are not errors; they are reported through
/// diagnostics in the job outcome.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Follow-up job {0} has no project")]
    MissingProject(String),

    #[error("No files stored for project {0}")]
    MissingFiles(String),

    #[error("Generation produced no usable changes: {0}")]
    EmptyGeneration(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Generation error: {0}")]
    Llm(#[from] LlmError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
