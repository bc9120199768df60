//! Generation jobs and their result payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::failure::Diagnostic;
use crate::fileset::FileSet;

/// Kind of generation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Create a new project from a template
    Initial,
    /// Edit an existing project
    FollowUp,
}

/// Job lifecycle status.
///
/// Transitions are one-directional: `pending → processing → {completed | failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `processing → processing` is permitted so checkpoints can be written
    /// while a job runs.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to generate or edit a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: String,
    pub user_id: String,
    /// Target project; required for follow-up jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub kind: JobKind,
    pub prompt: String,
    /// Arbitrary context: conversation history, template id, flags
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Create a new pending job.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        kind: JobKind,
        prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            project_id: None,
            kind,
            prompt: prompt.into(),
            context: serde_json::Value::Null,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// Read a string field from the job context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(|v| v.as_str())
    }

    /// Read a boolean flag from the job context (missing means false).
    pub fn context_flag(&self, key: &str) -> bool {
        self.context
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Conversation history as `(role, content)` pairs, if present.
    pub fn conversation(&self) -> Vec<(String, String)> {
        self.context
            .get("conversation")
            .and_then(|v| v.as_array())
            .map(|turns| {
                turns
                    .iter()
                    .filter_map(|t| {
                        let role = t.get("role")?.as_str()?;
                        let content = t.get("content")?.as_str()?;
                        Some((role.to_string(), content.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The checkpoint stored in the result payload while processing.
    pub fn checkpoint(&self) -> Option<JobCheckpoint> {
        if self.status != JobStatus::Processing {
            return None;
        }
        self.result
            .as_ref()
            .and_then(|r| r.get("checkpoint"))
            .and_then(|c| serde_json::from_value(c.clone()).ok())
    }
}

/// Pipeline stage reached by a job, used for resumption.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Started,
    Generated,
    Validated,
    Deployed,
}

/// Progress marker written while a job is processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobCheckpoint {
    pub stage: JobStage,
    pub project_id: String,
    pub updated_at: DateTime<Utc>,
}

impl JobCheckpoint {
    pub fn new(stage: JobStage, project_id: impl Into<String>) -> Self {
        Self {
            stage,
            project_id: project_id.into(),
            updated_at: Utc::now(),
        }
    }

    /// Wrap into the result payload shape.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "checkpoint": self })
    }
}

/// Aggregate generation usage for a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Terminal result payload of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub success: bool,
    pub project_id: String,
    pub files: FileSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_url: Option<String>,
    /// Deployment attempts made
    pub attempts: u32,
    /// Local build iterations made
    pub build_iterations: u32,
    pub stuck: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    #[serde(default)]
    pub usage: UsageTotals,
}

/// Error payload written when a job fails outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JobStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}
