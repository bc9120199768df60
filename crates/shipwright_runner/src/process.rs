//! Host process runner.
//!
//! Runs the build script through `sh -c` in the workspace directory with a
//! hard timeout. The child is killed if the timeout elapses.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{BuildCommand, BuildOutput, BuildRunner};

/// Runs builds as local processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

/// Spawn a command, wait with a timeout, and collect its output.
pub(crate) async fn run_with_timeout(
    mut cmd: Command,
    timeout: std::time::Duration,
) -> RunnerResult<BuildOutput> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let start = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|e| RunnerError::ExecutionFailed(format!("Failed to spawn: {}", e)))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result
            .map_err(|e| RunnerError::ExecutionFailed(format!("Failed to wait: {}", e)))?,
        Err(_) => {
            warn!("Build timed out after {:?}", timeout);
            return Err(RunnerError::Timeout(timeout.as_secs()));
        }
    };

    Ok(BuildOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[async_trait]
impl BuildRunner for ProcessRunner {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self, workdir: &Path, command: &BuildCommand) -> RunnerResult<BuildOutput> {
        let script = command.script();
        debug!("Executing in {:?}: {}", workdir, script);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&script).current_dir(workdir);
        cmd.env("CI", "true");
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        run_with_timeout(cmd, command.timeout).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "hello").unwrap();
        let runner = ProcessRunner::new();

        let ok = runner
            .run(dir.path(), &BuildCommand::new("cat marker.txt"))
            .await
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout, "hello");

        let failed = runner
            .run(dir.path(), &BuildCommand::new("echo boom >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn test_install_runs_first_and_env_is_passed() {
        let dir = tempfile::tempdir().unwrap();
        let command = BuildCommand::new("cat installed.txt && echo $MODE")
            .install("echo ready > installed.txt")
            .env("MODE", "prod");
        let out = ProcessRunner::new().run(dir.path(), &command).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "ready\nprod\n");
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let command = BuildCommand::new("sleep 5").timeout(Duration::from_millis(100));
        let err = ProcessRunner::new().run(dir.path(), &command).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout(_)));
    }
}
