//! Container CLI runner supporting Docker and Podman.
//!
//! The workspace is bind-mounted at `/workspace` and the build script runs
//! through `sh -c` inside the configured image.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::process::run_with_timeout;
use crate::runner::{BuildCommand, BuildOutput, BuildRunner};

/// Mount point of the workspace inside the container.
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Get the CLI command name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// Runs builds inside a container via the docker/podman CLI.
#[derive(Debug, Clone)]
pub struct ContainerCliRunner {
    runtime: ContainerRuntime,
    image: String,
    network: Option<String>,
}

impl ContainerCliRunner {
    /// Create a runner with automatic runtime detection.
    pub async fn detect(image: impl Into<String>) -> RunnerResult<Self> {
        let runtime = Self::detect_runtime().await?;
        info!("Using container runtime: {}", runtime);
        Ok(Self::with_runtime(runtime, image))
    }

    /// Create a runner with a specific runtime.
    pub fn with_runtime(runtime: ContainerRuntime, image: impl Into<String>) -> Self {
        Self {
            runtime,
            image: image.into(),
            network: None,
        }
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Detect available container runtime, Docker first.
    pub async fn detect_runtime() -> RunnerResult<ContainerRuntime> {
        for runtime in [ContainerRuntime::Docker, ContainerRuntime::Podman] {
            if Self::is_runtime_available(runtime).await {
                return Ok(runtime);
            }
            debug!("{} not available", runtime);
        }
        Err(RunnerError::RuntimeNotAvailable(
            "Neither Docker nor Podman is available".to_string(),
        ))
    }

    async fn is_runtime_available(runtime: ContainerRuntime) -> bool {
        Command::new(runtime.command())
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build the command line arguments for running the build.
    pub fn build_run_args(&self, workdir: &Path, command: &BuildCommand) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-w".to_string(),
            CONTAINER_WORKDIR.to_string(),
            "-v".to_string(),
            format!("{}:{}", workdir.to_string_lossy(), CONTAINER_WORKDIR),
            "-e".to_string(),
            "CI=true".to_string(),
        ];

        let mut env: Vec<_> = command.env.iter().collect();
        env.sort();
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if let Some(network) = &self.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        args.push(self.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(command.script());
        args
    }

    /// Format command for logging.
    fn format_command(&self, args: &[String]) -> String {
        let mut cmd = self.runtime.command().to_string();
        for arg in args {
            if arg.contains(' ') || arg.contains('=') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push_str(&format!(" {}", arg));
            }
        }
        cmd
    }
}

#[async_trait]
impl BuildRunner for ContainerCliRunner {
    fn name(&self) -> &str {
        self.runtime.command()
    }

    async fn run(&self, workdir: &Path, command: &BuildCommand) -> RunnerResult<BuildOutput> {
        let args = self.build_run_args(workdir, command);
        debug!("Executing: {}", self.format_command(&args));

        let mut cmd = Command::new(self.runtime.command());
        cmd.args(&args);
        let output = run_with_timeout(cmd, command.timeout).await?;
        if output.exit_code == 125 {
            // Exit 125 is the runtime itself failing (bad image, daemon down)
            warn!("{} failed to start the container", self.runtime);
            return Err(RunnerError::ExecutionFailed(output.stderr));
        }
        Ok(output)
    }
}
