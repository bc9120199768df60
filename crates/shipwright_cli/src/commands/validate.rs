//! Validate command - Run the build-fix loop on a project directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use shipwright_core::ShipwrightConfig;
use shipwright_llm::GenerationGateway;
use shipwright_pipeline::BuildValidator;
use shipwright_runner::create_runner;

use super::{print_json, read_dir_files, write_dir_files, CommandFailure};

#[derive(Args)]
pub struct ValidateArgs {
    /// Project directory to build
    #[arg(short, long)]
    dir: PathBuf,

    /// Override the configured iteration budget
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Write repaired files back into the directory
    #[arg(long)]
    write: bool,
}

pub async fn execute(args: ValidateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = ShipwrightConfig::discover(config_path).context("Failed to load configuration")?;
    let files = read_dir_files(&args.dir)?;
    info!(files = files.len(), "Validating {:?}", args.dir);

    let gateway = GenerationGateway::from_config(&config.generation)
        .context("Failed to configure the generation service")?;
    let runner = create_runner(&config.build)
        .await
        .context("Failed to create build runner")?;
    let validator = BuildValidator::from_config(runner, &config.build);

    let max_iterations = args.max_iterations.unwrap_or(config.build.max_iterations).max(1);
    let outcome = validator
        .validate(files, &gateway, max_iterations)
        .await
        .context("Build validation could not run")?;
    print_json(&outcome)?;

    if args.write {
        write_dir_files(&args.dir, &outcome.files)?;
    }
    if !outcome.success {
        return Err(CommandFailure::ValidationFailed {
            iterations: outcome.iterations,
        }
        .into());
    }
    println!("Build passed after {} iteration(s)", outcome.iterations);
    Ok(())
}
