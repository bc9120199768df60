//! # shipwright_runner
//!
//! Local build execution for Shipwright.
//!
//! A [`ScratchWorkspace`] receives a complete file snapshot, then a
//! [`BuildRunner`] runs the install and build commands in it:
//!
//! - [`ProcessRunner`]: host process through `sh -c`
//! - [`ContainerCliRunner`]: docker or podman with the workspace bind-mounted
//! - [`MockRunner`]: scripted results for tests

pub mod container;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;
pub mod workspace;

use std::sync::Arc;

use shipwright_core::{BuildConfig, RunnerKind};

pub use container::{ContainerCliRunner, ContainerRuntime};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedRun, MockBuild, MockRunner};
pub use process::ProcessRunner;
pub use runner::{BuildCommand, BuildOutput, BuildRunner};
pub use workspace::{resolve_within, ScratchWorkspace};

/// Create the runner selected by the build configuration.
pub async fn create_runner(config: &BuildConfig) -> RunnerResult<Arc<dyn BuildRunner>> {
    match config.runner {
        RunnerKind::Process => Ok(Arc::new(ProcessRunner::new())),
        RunnerKind::Container => Ok(Arc::new(
            ContainerCliRunner::detect(config.image.clone()).await?,
        )),
    }
}
