//! Mock build runner for testing.
//!
//! Returns scripted build results in order (cycling when exhausted) and
//! captures the workspace contents seen by every run.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use shipwright_core::FileSet;

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{BuildCommand, BuildOutput, BuildRunner};
use crate::workspace::list_relative_files;

/// Predefined mock result for a build.
#[derive(Debug, Clone)]
pub enum MockBuild {
    Output(BuildOutput),
    Timeout,
}

impl MockBuild {
    pub fn pass(stdout: impl Into<String>) -> Self {
        Self::Output(BuildOutput {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        })
    }

    pub fn fail(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Output(BuildOutput {
            exit_code: 1,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms: 100,
        })
    }
}

/// Captured run information for verification.
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub script: String,
    /// Workspace contents at the time of the run
    pub files: FileSet,
}

/// Mock build runner.
#[derive(Clone, Default)]
pub struct MockRunner {
    builds: Arc<RwLock<Vec<MockBuild>>>,
    build_index: Arc<AtomicUsize>,
    captured: Arc<RwLock<Vec<CapturedRun>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result for the next run.
    pub fn add_build(self, build: MockBuild) -> Self {
        self.builds.write().push(build);
        self
    }

    pub fn with_builds(self, builds: Vec<MockBuild>) -> Self {
        *self.builds.write() = builds;
        self
    }

    /// Get all captured runs.
    pub fn runs(&self) -> Vec<CapturedRun> {
        self.captured.read().clone()
    }

    pub fn run_count(&self) -> usize {
        self.captured.read().len()
    }

    fn next_build(&self) -> MockBuild {
        let builds = self.builds.read();
        if builds.is_empty() {
            return MockBuild::pass("");
        }
        let index = self.build_index.fetch_add(1, Ordering::SeqCst);
        builds
            .get(index % builds.len())
            .cloned()
            .unwrap_or_else(|| MockBuild::pass(""))
    }
}

fn snapshot(root: &Path) -> FileSet {
    list_relative_files(root, &["node_modules".to_string()])
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(root.join(&path)).ok()?;
            Some((path, content))
        })
        .collect()
}

#[async_trait]
impl BuildRunner for MockRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, workdir: &Path, command: &BuildCommand) -> RunnerResult<BuildOutput> {
        self.captured.write().push(CapturedRun {
            script: command.script(),
            files: snapshot(workdir),
        });
        match self.next_build() {
            MockBuild::Output(output) => Ok(output),
            MockBuild::Timeout => Err(RunnerError::Timeout(command.timeout.as_secs())),
        }
    }
}
