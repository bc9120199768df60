//! Prompt construction for generation and fix requests.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use shipwright_core::{FileSet, JobKind, ParseOutcome, Phase};

/// Files longer than this are rendered as windows around marked lines.
const MAX_FULL_FILE_LINES: usize = 400;
/// Lines of context kept on each side of a marked line in windowed files.
const WINDOW: usize = 15;
/// Budget for file contents included in a generation prompt.
const MAX_CONTEXT_CHARS: usize = 60_000;

const RESPONSE_FORMAT: &str = "\
Respond only with change blocks in this format:

### FILE: <relative path>
```<lang>
<complete new file content>
```

### DIFF: <relative path>
```diff
<unified diff with @@ hunk headers>
```

### DELETE: <relative path>

Use DIFF for small, local edits and FILE for new files or large rewrites. \
Never emit partial files inside a FILE block.";

/// System prompt for project generation.
pub fn generation_system_prompt() -> String {
    format!(
        "You are a senior web engineer generating a complete, buildable project. \
The project must compile with its build command and deploy without manual steps.\n\n{}",
        RESPONSE_FORMAT
    )
}

/// System prompt for build and deploy fixes.
pub fn fix_system_prompt() -> String {
    format!(
        "You fix build errors in an existing project. Change as little as possible. \
Lines marked with >> are where the compiler reported errors. Do not add features.\n\n{}",
        RESPONSE_FORMAT
    )
}

/// User prompt for generation or a follow-up edit.
pub fn build_generation_prompt(
    kind: JobKind,
    request: &str,
    files: &FileSet,
    conversation: &[(String, String)],
) -> String {
    let mut out = String::new();
    match kind {
        JobKind::Initial => {
            let _ = writeln!(out, "Create a project for this request, starting from the template files below.");
        }
        JobKind::FollowUp => {
            let _ = writeln!(out, "Apply this change to the existing project below.");
        }
    }
    let _ = writeln!(out, "\n## Request\n{}", request.trim());

    if !conversation.is_empty() {
        let _ = writeln!(out, "\n## Conversation so far");
        for (role, content) in conversation {
            let _ = writeln!(out, "- {}: {}", role, content.trim());
        }
    }

    let _ = writeln!(out, "\n## Project files");
    let mut budget = MAX_CONTEXT_CHARS;
    let mut omitted = Vec::new();
    for (path, content) in files.iter() {
        if content.len() > budget {
            omitted.push(path);
            continue;
        }
        budget -= content.len();
        let _ = writeln!(out, "\n### {}\n```\n{}\n```", path, content.trim_end());
    }
    if !omitted.is_empty() {
        let _ = writeln!(out, "\nAlso present (content omitted): {}", omitted.join(", "));
    }
    out
}

/// User prompt asking for fixes to parsed errors.
pub fn build_fix_prompt(files: &FileSet, outcome: &ParseOutcome, phase: Phase) -> String {
    let mut out = String::new();
    let stage = match phase {
        Phase::Deploy | Phase::Prerequisite => "The hosting platform build failed.",
        _ => "The local build failed.",
    };
    let _ = writeln!(out, "{} {}\n", stage, outcome.summary.lines().next().unwrap_or(""));

    for (path, errors) in outcome.by_file() {
        let _ = writeln!(out, "## {}", path);
        for error in &errors {
            let _ = writeln!(out, "- {}", error.display_line());
        }
        match files.get(&path) {
            Some(content) => {
                let marked: BTreeSet<u32> = errors.iter().filter_map(|e| e.line).collect();
                let _ = writeln!(out, "```\n{}```\n", render_numbered(content, &marked));
            }
            None => {
                let _ = writeln!(out, "(file not present in project)\n");
            }
        }
    }

    let general = outcome.unanchored();
    if !general.is_empty() {
        let _ = writeln!(out, "## General errors");
        for error in general {
            let _ = writeln!(out, "- {}", error.display_line());
            if let Some(context) = &error.context {
                let _ = writeln!(out, "```\n{}\n```", context.trim_end());
            }
        }
        let _ = writeln!(out, "\nProject files: {}", files.paths().collect::<Vec<_>>().join(", "));
    }
    out
}

/// Render content with 1-based line numbers and `>>` on marked lines.
///
/// Long files are cut down to windows around the marked lines.
pub fn render_numbered(content: &str, marked: &BTreeSet<u32>) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let width = lines.len().max(1).to_string().len();

    let keep = |index: usize| -> bool {
        if lines.len() <= MAX_FULL_FILE_LINES || marked.is_empty() {
            return lines.len() <= MAX_FULL_FILE_LINES || index < MAX_FULL_FILE_LINES;
        }
        let number = index as u32 + 1;
        marked
            .iter()
            .any(|m| number.abs_diff(*m) as usize <= WINDOW)
    };

    let mut out = String::new();
    let mut skipping = false;
    for (index, line) in lines.iter().enumerate() {
        if !keep(index) {
            if !skipping {
                out.push_str("   ...\n");
                skipping = true;
            }
            continue;
        }
        skipping = false;
        let number = index + 1;
        let marker = if marked.contains(&(number as u32)) { ">>" } else { "  " };
        let _ = writeln!(out, "{} {:>width$} | {}", marker, number, line, width = width);
    }
    out
}
