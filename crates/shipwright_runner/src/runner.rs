//! Build runner trait and types.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shipwright_core::BuildConfig;

use crate::error::RunnerResult;

/// What to run in a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    /// Shell command for the build check
    pub build: String,
    /// Optional shell command run before the build
    pub install: Option<String>,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
}

impl BuildCommand {
    pub fn new(build: impl Into<String>) -> Self {
        Self {
            build: build.into(),
            install: None,
            timeout: Duration::from_secs(300),
            env: HashMap::new(),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            build: config.command.clone(),
            install: config.install.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            env: HashMap::new(),
        }
    }

    pub fn install(mut self, install: impl Into<String>) -> Self {
        self.install = Some(install.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The full script: install (if any) then build.
    pub fn script(&self) -> String {
        match &self.install {
            Some(install) => format!("{} && {}", install, self.build),
            None => self.build.clone(),
        }
    }
}

/// Result of a build run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl BuildOutput {
    /// Check if the build passed (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs a build command inside a directory.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Runner name for logs.
    fn name(&self) -> &str;

    async fn run(&self, workdir: &Path, command: &BuildCommand) -> RunnerResult<BuildOutput>;
}
