//! Patch response parsing.
//!
//! Generation and fix responses use marker headers followed by fenced blocks:
//!
//! ```text
//! ### FILE: src/app/page.tsx      whole-file content
//! ### DIFF: src/lib/util.ts       unified diff
//! ### DELETE: src/old.ts          no body
//! ```
//!
//! A bare unified diff (with `---`/`+++` headers) is accepted as well.

use tracing::warn;

use shipwright_core::{normalize_path, ApplyReport, Diff, DiffApplicator, FileSet};

use crate::error::{LlmError, LlmResult};

const FILE_MARKER: &str = "### FILE:";
const DIFF_MARKER: &str = "### DIFF:";
const DELETE_MARKER: &str = "### DELETE:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    File,
    Diff,
    Delete,
}

/// Parsed changes from a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    /// Whole files as `(path, content)`
    pub files: Vec<(String, String)>,
    pub diffs: Vec<Diff>,
    pub deletions: Vec<String>,
}

impl Patch {
    /// Parse a response. Fails with `PatchParse` when nothing usable is found.
    pub fn parse(text: &str) -> LlmResult<Self> {
        let mut patch = Self::default();
        let mut current: Option<(BlockKind, String, Vec<&str>)> = None;

        for line in text.lines() {
            if let Some((kind, path)) = block_header(line) {
                if let Some(block) = current.take() {
                    patch.push_block(block);
                }
                current = Some((kind, path, Vec::new()));
                continue;
            }
            if let Some((_, _, body)) = current.as_mut() {
                body.push(line);
            }
        }
        if let Some(block) = current.take() {
            patch.push_block(block);
        }

        if patch.is_empty() && looks_like_unified_diff(text) {
            let body = strip_fence(&text.lines().collect::<Vec<_>>());
            if let Ok(diffs) = Diff::parse_unified(&body) {
                patch.diffs = diffs;
            }
        }

        if patch.is_empty() {
            return Err(LlmError::PatchParse(format!(
                "no FILE, DIFF or DELETE blocks in {} chars of response",
                text.len()
            )));
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.diffs.is_empty() && self.deletions.is_empty()
    }

    /// Paths touched by this patch.
    pub fn paths(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|(p, _)| p.clone())
            .chain(self.diffs.iter().map(|d| d.file.clone()))
            .chain(self.deletions.iter().cloned())
            .collect()
    }

    /// Convert into diffs for the applicator.
    pub fn into_diffs(self) -> Vec<Diff> {
        let mut diffs: Vec<Diff> = self
            .files
            .into_iter()
            .map(|(path, content)| Diff::whole_file(path, content))
            .collect();
        diffs.extend(self.diffs);
        diffs.extend(self.deletions.into_iter().map(Diff::deletion));
        diffs
    }

    /// Apply to a base file set.
    pub fn apply(self, base: &FileSet) -> ApplyReport {
        DiffApplicator::new().apply_with_report(base, &self.into_diffs())
    }

    fn push_block(&mut self, (kind, path, body): (BlockKind, String, Vec<&str>)) {
        if !is_safe_path(&path) {
            warn!("Ignoring patch block with unsafe path: {}", path);
            return;
        }
        match kind {
            BlockKind::Delete => self.deletions.push(path),
            BlockKind::File => {
                let content = strip_fence(&body);
                if content.trim().is_empty() {
                    warn!("Ignoring empty FILE block for {}", path);
                    return;
                }
                self.files.push((path, content));
            }
            BlockKind::Diff => {
                let text = strip_fence(&body);
                if text.trim().is_empty() {
                    warn!("Ignoring empty DIFF block for {}", path);
                    return;
                }
                if Diff::has_file_headers(&text) {
                    match Diff::parse_unified(&text) {
                        Ok(diffs) => self.diffs.extend(diffs),
                        Err(e) => warn!("Ignoring malformed DIFF block for {}: {}", path, e),
                    }
                } else {
                    self.diffs.push(Diff::new(&path).with_unified(text));
                }
            }
        }
    }
}

fn block_header(line: &str) -> Option<(BlockKind, String)> {
    let line = line.trim();
    let (kind, rest) = if let Some(rest) = line.strip_prefix(FILE_MARKER) {
        (BlockKind::File, rest)
    } else if let Some(rest) = line.strip_prefix(DIFF_MARKER) {
        (BlockKind::Diff, rest)
    } else if let Some(rest) = line.strip_prefix(DELETE_MARKER) {
        (BlockKind::Delete, rest)
    } else {
        return None;
    };
    let path = normalize_path(rest.trim().trim_matches('`'));
    if path.is_empty() {
        return None;
    }
    Some((kind, path))
}

/// Body between the first opening fence and the last closing fence, or the
/// trimmed body if unfenced. Always ends with a newline.
fn strip_fence(lines: &[&str]) -> String {
    let open = lines.iter().position(|l| l.trim_start().starts_with("```"));
    let body: &[&str] = match open {
        Some(open) => {
            let close = lines
                .iter()
                .rposition(|l| l.trim() == "```")
                .filter(|c| *c > open)
                .unwrap_or(lines.len());
            &lines[open + 1..close]
        }
        None => {
            let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(0);
            let end = lines
                .iter()
                .rposition(|l| !l.trim().is_empty())
                .map(|e| e + 1)
                .unwrap_or(start);
            &lines[start..end]
        }
    };
    if body.is_empty() {
        return String::new();
    }
    let mut out = body.join("\n");
    out.push('\n');
    out
}

fn looks_like_unified_diff(text: &str) -> bool {
    Diff::has_file_headers(text) && text.lines().any(|l| l.starts_with("+++ "))
}

fn is_safe_path(path: &str) -> bool {
    !path.split('/').any(|segment| segment == "..") && !path.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_blocks() {
        let text = "Here you go.\n\n### FILE: src/app/page.tsx\n```tsx\nexport default function Page() {\n  return <main />;\n}\n```\n\n### DELETE: src/old.ts\n";
        let patch = Patch::parse(text).unwrap();
        assert_eq!(patch.files.len(), 1);
        assert_eq!(patch.files[0].0, "src/app/page.tsx");
        assert_eq!(
            patch.files[0].1,
            "export default function Page() {\n  return <main />;\n}\n"
        );
        assert_eq!(patch.deletions, vec!["src/old.ts".to_string()]);
    }

    #[test]
    fn test_nested_fences_keep_inner_blocks() {
        let text = "### FILE: README.md\n```md\n# App\n```bash\nnpm run dev\n```\n```\n";
        let patch = Patch::parse(text).unwrap();
        assert_eq!(patch.files[0].1, "# App\n```bash\nnpm run dev\n```\n");
    }

    #[test]
    fn test_diff_block_applies() {
        let base = FileSet::new().with_file("src/a.ts", "line1\nline2\nline3\n");
        let text = "### DIFF: src/a.ts\n```diff\n@@ -2,1 +2,1 @@\n-line2\n+lineX\n```\n";
        let report = Patch::parse(text).unwrap().apply(&base);
        assert_eq!(report.files.get("src/a.ts"), Some("line1\nlineX\nline3\n"));
    }

    #[test]
    fn test_bare_unified_diff() {
        let text = "```diff\n--- a/src/a.ts\n+++ b/src/a.ts\n@@ -1,1 +1,1 @@\n-a\n+b\n```";
        let patch = Patch::parse(text).unwrap();
        assert_eq!(patch.diffs.len(), 1);
        assert_eq!(patch.diffs[0].file, "src/a.ts");
    }

    #[test]
    fn test_diff_removing_sql_comment() {
        let base = FileSet::new().with_file("db/schema.sql", "-- old note\ncreate table t (id int);\n");
        let text = "### DIFF: db/schema.sql\n```diff\n--- a/db/schema.sql\n+++ b/db/schema.sql\n@@ -1,2 +1,2 @@\n--- old note\n+-- new note\n create table t (id int);\n```\n";
        let report = Patch::parse(text).unwrap().apply(&base);
        assert_eq!(
            report.files.get("db/schema.sql"),
            Some("-- new note\ncreate table t (id int);\n")
        );
        assert_eq!(report.changed, vec!["db/schema.sql".to_string()]);
        assert!(report.notes.is_empty());
    }

    #[test]
    fn test_unparseable_response() {
        let err = Patch::parse("I could not find any issues with your code.").unwrap_err();
        assert!(matches!(err, LlmError::PatchParse(_)));
    }

    #[test]
    fn test_unsafe_paths_dropped() {
        let text = "### FILE: ../../etc/passwd\n```\nroot\n```\n### FILE: src/ok.ts\n```\nok\n```\n";
        let patch = Patch::parse(text).unwrap();
        assert_eq!(patch.paths(), vec!["src/ok.ts".to_string()]);
    }

    #[test]
    fn test_whole_file_creates_missing_file() {
        let base = FileSet::new();
        let report = Patch::parse("### FILE: src/new.ts\n```ts\nexport const x = 1;\n```\n")
            .unwrap()
            .apply(&base);
        assert_eq!(report.files.get("src/new.ts"), Some("export const x = 1;\n"));
    }
}
