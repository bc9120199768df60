//! Parse-log command - Turn a build or deployment log into structured errors.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use shipwright_core::{ErrorParser, ErrorSignature};

use super::print_json;

#[derive(Args)]
pub struct ParseLogArgs {
    /// Log file (stdout of the build, or a combined log)
    log: PathBuf,

    /// Separate stderr capture
    #[arg(long)]
    stderr: Option<PathBuf>,

    /// Treat the log as coming from a failed run
    #[arg(long)]
    failed: bool,
}

pub async fn execute(args: ParseLogArgs) -> Result<()> {
    let stdout = std::fs::read_to_string(&args.log)
        .with_context(|| format!("Failed to read {}", args.log.display()))?;
    let stderr = match &args.stderr {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let parser = ErrorParser::new();
    let outcome = if args.failed {
        parser.parse_failed(&stdout, &stderr)
    } else {
        parser.parse(&stdout, &stderr)
    };
    print_json(&outcome)?;

    if !outcome.summary.is_empty() {
        eprintln!("signature: {}", ErrorSignature::from_raw(&outcome.summary).as_str());
    }
    Ok(())
}
