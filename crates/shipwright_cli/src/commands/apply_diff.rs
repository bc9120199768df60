//! Apply-diff command - Apply a patch response or unified diff to a directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use shipwright_core::{ApplyReport, Diff, DiffApplicator, FileSet};
use shipwright_llm::Patch;

use super::{read_dir_files, write_dir_files};

#[derive(Args)]
pub struct ApplyDiffArgs {
    /// Directory holding the base files
    #[arg(long)]
    base: PathBuf,

    /// Patch file (`### FILE:` / `### DIFF:` blocks or a unified diff)
    #[arg(long)]
    diff: PathBuf,

    /// Write the patched files here; without it nothing is written
    #[arg(short, long)]
    out: Option<PathBuf>,
}

/// Apply `text` to `base`, accepting either patch blocks or a unified diff.
pub fn apply_text(base: &FileSet, text: &str) -> Result<ApplyReport> {
    if text.lines().any(|l| l.starts_with("### ")) {
        let patch = Patch::parse(text).context("Failed to parse patch")?;
        return Ok(patch.apply(base));
    }
    let diffs = Diff::parse_unified(text).context("Failed to parse unified diff")?;
    Ok(DiffApplicator::new().apply_with_report(base, &diffs))
}

pub async fn execute(args: ApplyDiffArgs) -> Result<()> {
    let base = read_dir_files(&args.base)?;
    let text = std::fs::read_to_string(&args.diff)
        .with_context(|| format!("Failed to read {}", args.diff.display()))?;

    let report = apply_text(&base, &text)?;
    for note in &report.notes {
        warn!(file = %note.file, kind = ?note.kind, "{}", note.message);
    }
    for path in &report.changed {
        println!("changed: {}", path);
    }

    match &args.out {
        Some(out) => {
            write_dir_files(out, &report.files)?;
            info!(files = report.files.len(), "Wrote patched files to {:?}", out);
        }
        None => println!("(dry run; pass --out to write {} file(s))", report.files.len()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> FileSet {
        FileSet::new()
            .with_file("src/a.ts", "const a = 1;\nconst b = 2;")
            .with_file("README.md", "hello\n")
    }

    #[test]
    fn test_patch_blocks() {
        let text = "### FILE: src/new.ts\n```ts\nexport {};\n```\n\n### DELETE: README.md\n";
        let report = apply_text(&base(), text).unwrap();
        assert_eq!(report.files.get("src/new.ts"), Some("export {};\n"));
        assert!(!report.files.contains("README.md"));
    }

    #[test]
    fn test_unified_diff() {
        let text = "\
--- a/src/a.ts
+++ b/src/a.ts
@@ -1,2 +1,2 @@
 const a = 1;
-const b = 2;
+const b = 3;
";
        let report = apply_text(&base(), text).unwrap();
        assert_eq!(report.files.get("src/a.ts"), Some("const a = 1;\nconst b = 3;"));
        assert_eq!(report.changed, vec!["src/a.ts".to_string()]);
    }
}
