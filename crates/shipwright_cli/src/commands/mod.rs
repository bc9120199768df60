//! CLI command definitions.
//!
//! Each subcommand maps to one stage of the pipeline, or the whole of it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thiserror::Error;

use shipwright_core::FileSet;
use shipwright_runner::resolve_within;
use shipwright_runner::workspace::list_relative_files;

pub mod apply_diff;
pub mod parse_log;
pub mod run;
pub mod validate;

/// Directories never read into a file set.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".next", "dist"];

/// Shipwright - self-healing generation-to-deployment pipeline
#[derive(Parser)]
#[command(name = "shipwright")]
#[command(version, about = "Shipwright - self-healing generation-to-deployment pipeline")]
#[command(long_about = r#"
Shipwright turns a natural-language request into a deployed web project,
repairing build and deployment failures along the way.

COMMANDS:
  run         → Execute a generation job end to end
  parse-log   → Parse a build or deploy log into structured errors
  apply-diff  → Apply a patch or unified diff to a directory
  validate    → Run the build-fix loop on a directory

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Job or validation failure
  4 - Template error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to shipwright.toml
    #[arg(short, long, global = true, env = "SHIPWRIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a generation job described by a JSON file
    Run(run::RunArgs),

    /// Parse a build or deployment log
    #[command(name = "parse-log")]
    ParseLog(parse_log::ParseLogArgs),

    /// Apply a patch or unified diff to a directory
    #[command(name = "apply-diff")]
    ApplyDiff(apply_diff::ApplyDiffArgs),

    /// Build a directory, repairing failures through the generation service
    Validate(validate::ValidateArgs),
}

/// A command that ran but did not reach its goal.
#[derive(Error, Debug)]
pub enum CommandFailure {
    #[error("Job {job_id} finished with status {status}")]
    JobFailed { job_id: String, status: String },

    #[error("Build validation failed after {iterations} iteration(s)")]
    ValidationFailed { iterations: u32 },
}

/// Read every UTF-8 file under `dir` into a file set.
pub fn read_dir_files(dir: &Path) -> Result<FileSet> {
    if !dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        ))
        .context("Failed to read project directory");
    }
    let skip: Vec<String> = SKIP_DIRS.iter().map(|s| s.to_string()).collect();
    let mut files = FileSet::new();
    for path in list_relative_files(dir, &skip) {
        match fs::read_to_string(dir.join(&path)) {
            Ok(content) => {
                files.insert(&path, content);
            }
            Err(e) => tracing::debug!("Skipping {}: {}", path, e),
        }
    }
    Ok(files)
}

/// Write a file set under `dir`, creating directories as needed.
pub fn write_dir_files(dir: &Path, files: &FileSet) -> Result<()> {
    for (path, content) in files.iter() {
        let target = resolve_within(dir, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, content)
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }
    Ok(())
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
