//! Diff application over in-memory file sets.
//!
//! A [`Diff`] targets one file and carries line-range hunks and/or unified diff
//! text, optionally with a whole-file replacement to fall back on. Application
//! is atomic per file: either every accepted hunk lands in the new content or
//! the file is left untouched. A conflicting hunk is skipped and recorded as an
//! [`ApplyNote`] instead of aborting the batch. Inputs are never mutated.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::fileset::{normalize_path, FileSet};

/// A localized edit: replace `remove_count` lines starting at `start_line`
/// (1-based) with `new_lines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    pub start_line: usize,
    pub remove_count: usize,
    pub new_lines: Vec<String>,
    /// Lines expected at the target range; empty skips the context check
    #[serde(default)]
    pub expected: Vec<String>,
}

impl DiffHunk {
    pub fn new(start_line: usize, remove_count: usize, new_lines: Vec<String>) -> Self {
        Self {
            start_line,
            remove_count,
            new_lines,
            expected: Vec::new(),
        }
    }

    /// Replace a single line.
    pub fn replace_line(line: usize, content: impl Into<String>) -> Self {
        Self::new(line, 1, vec![content.into()])
    }

    /// Insert lines before `line` without removing anything.
    pub fn insert_before(line: usize, lines: Vec<String>) -> Self {
        Self::new(line, 0, lines)
    }

    pub fn expecting(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }
}

/// Proposed change to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub file: String,
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
    /// Unified diff text; parsed into hunks when `hunks` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified: Option<String>,
    /// Whole-file content used when hunks conflict or the file is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    /// Remove the file
    #[serde(default)]
    pub delete: bool,
    /// Create the file; hunks must not remove anything
    #[serde(default)]
    pub create: bool,
}

impl Diff {
    pub fn new(file: impl AsRef<str>) -> Self {
        Self {
            file: normalize_path(file.as_ref()),
            ..Default::default()
        }
    }

    pub fn hunk(mut self, hunk: DiffHunk) -> Self {
        self.hunks.push(hunk);
        self
    }

    pub fn with_unified(mut self, text: impl Into<String>) -> Self {
        self.unified = Some(text.into());
        self
    }

    pub fn with_replacement(mut self, content: impl Into<String>) -> Self {
        self.replacement = Some(content.into());
        self
    }

    /// Whole-file replacement with no hunks.
    pub fn whole_file(file: impl AsRef<str>, content: impl Into<String>) -> Self {
        Self::new(file).with_replacement(content)
    }

    pub fn deletion(file: impl AsRef<str>) -> Self {
        Self {
            delete: true,
            ..Self::new(file)
        }
    }

    /// Hunks, parsing the unified text if needed.
    pub fn resolved_hunks(&self) -> CoreResult<Vec<DiffHunk>> {
        if !self.hunks.is_empty() {
            return Ok(self.hunks.clone());
        }
        match &self.unified {
            Some(text) => parse_hunks(&self.file, text),
            None => Ok(Vec::new()),
        }
    }

    fn is_pure_addition(&self, hunks: &[DiffHunk]) -> bool {
        if self.create {
            return true;
        }
        !hunks.is_empty() && hunks.iter().all(|h| h.remove_count == 0 && h.expected.is_empty())
    }

    /// Parse multi-file unified diff text (`--- a/x` / `+++ b/x` headers).
    pub fn parse_unified(text: &str) -> CoreResult<Vec<Diff>> {
        let mut diffs = Vec::new();
        let mut old_path: Option<String> = None;
        let mut current: Option<(Diff, String)> = None;
        let mut cursor = HunkCursor::default();

        for line in text.lines() {
            let header = cursor.is_file_header(line);
            let in_hunk = cursor.in_hunk();
            cursor.advance(line);

            if header {
                if let Some(rest) = line.strip_prefix("--- ") {
                    if let Some((diff, body)) = current.take() {
                        diffs.push(diff.with_unified(body));
                    }
                    old_path = Some(strip_diff_prefix(rest));
                } else if let Some(rest) = line.strip_prefix("+++ ") {
                    let new_path = strip_diff_prefix(rest);
                    let old = old_path.take().unwrap_or_default();
                    let diff = if new_path == "/dev/null" {
                        Diff::deletion(&old)
                    } else {
                        let mut diff = Diff::new(&new_path);
                        diff.create = old == "/dev/null";
                        diff
                    };
                    current = Some((diff, String::new()));
                }
                continue;
            }
            if !in_hunk && (line.starts_with("diff --git") || line.starts_with("index ")) {
                continue;
            }
            if let Some((_, body)) = current.as_mut() {
                body.push_str(line);
                body.push('\n');
            }
        }
        if let Some((diff, body)) = current.take() {
            diffs.push(diff.with_unified(body));
        }

        if diffs.is_empty() {
            return Err(CoreError::MalformedDiff {
                file: String::new(),
                message: "no file headers found".to_string(),
            });
        }
        Ok(diffs)
    }

    /// Whether `text` contains a `--- ` file header outside any hunk body.
    pub fn has_file_headers(text: &str) -> bool {
        let mut cursor = HunkCursor::default();
        text.lines().any(|line| {
            let header = cursor.is_file_header(line) && line.starts_with("--- ");
            cursor.advance(line);
            header
        })
    }
}

/// Position within the `@@` hunks of a unified diff.
///
/// Counts down the line totals from each hunk header so that body lines
/// shaped like file headers (removing `-- note` reads `--- note`) stay in
/// their hunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct HunkCursor {
    old_left: usize,
    new_left: usize,
}

impl HunkCursor {
    pub fn in_hunk(&self) -> bool {
        self.old_left > 0 || self.new_left > 0
    }

    /// A `---`/`+++` line outside a hunk body.
    pub fn is_file_header(&self, line: &str) -> bool {
        !self.in_hunk() && (line.starts_with("--- ") || line.starts_with("+++ "))
    }

    /// Move past `line`.
    pub fn advance(&mut self, line: &str) {
        if line.starts_with("@@") {
            let (old, new) = parse_hunk_counts(line).unwrap_or((0, 0));
            self.old_left = old;
            self.new_left = new;
            return;
        }
        if !self.in_hunk() || line.starts_with('\\') {
            return;
        }
        if line.starts_with('-') {
            self.old_left = self.old_left.saturating_sub(1);
        } else if line.starts_with('+') {
            self.new_left = self.new_left.saturating_sub(1);
        } else {
            self.old_left = self.old_left.saturating_sub(1);
            self.new_left = self.new_left.saturating_sub(1);
        }
    }
}

fn strip_diff_prefix(raw: &str) -> String {
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == "/dev/null" {
        return path.to_string();
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    normalize_path(path)
}

/// Parse the `@@` sections of a single-file unified diff into hunks.
fn parse_hunks(file: &str, text: &str) -> CoreResult<Vec<DiffHunk>> {
    let mut hunks = Vec::new();
    let mut current: Option<DiffHunk> = None;

    for line in text.lines() {
        if line.starts_with("@@") {
            if let Some(h) = current.take() {
                hunks.push(h);
            }
            let (old_start, old_count) = parse_range_header(line).ok_or_else(|| {
                CoreError::MalformedDiff {
                    file: file.to_string(),
                    message: format!("bad hunk header: {}", line),
                }
            })?;
            // `-0,0` and `-N,0` address the gap after line N
            let start = if old_count == 0 { old_start + 1 } else { old_start };
            current = Some(DiffHunk::new(start.max(1), 0, Vec::new()));
            continue;
        }
        let Some(hunk) = current.as_mut() else {
            continue;
        };
        if line.starts_with('\\') {
            continue;
        }
        if let Some(rest) = line.strip_prefix('-') {
            hunk.expected.push(rest.to_string());
            hunk.remove_count += 1;
        } else if let Some(rest) = line.strip_prefix('+') {
            hunk.new_lines.push(rest.to_string());
        } else {
            let rest = line.strip_prefix(' ').unwrap_or(line);
            hunk.expected.push(rest.to_string());
            hunk.new_lines.push(rest.to_string());
            hunk.remove_count += 1;
        }
    }
    if let Some(h) = current.take() {
        hunks.push(h);
    }
    Ok(hunks)
}

/// Parse `@@ -a,b +c,d @@` returning `(a, b)`.
fn parse_range_header(line: &str) -> Option<(usize, usize)> {
    let old = line.split_whitespace().nth(1)?.strip_prefix('-')?;
    let mut parts = old.splitn(2, ',');
    let start = parts.next()?.parse().ok()?;
    let count = match parts.next() {
        Some(c) => c.parse().ok()?,
        None => 1,
    };
    Some((start, count))
}

/// Parse `@@ -a,b +c,d @@` returning the line counts `(b, d)`.
fn parse_hunk_counts(line: &str) -> Option<(usize, usize)> {
    let mut ranges = line.split_whitespace().skip(1);
    let old = ranges.next()?.strip_prefix('-')?;
    let new = ranges.next()?.strip_prefix('+')?;
    let count = |range: &str| -> Option<usize> {
        match range.split_once(',') {
            Some((_, count)) => count.parse().ok(),
            None => Some(1),
        }
    };
    Some((count(old)?, count(new)?))
}

/// Kind of note recorded while applying diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyNoteKind {
    /// Hunk context did not match; hunk skipped
    Conflict,
    /// Target file missing and diff is not an addition; diff skipped
    MissingFile,
    /// Hunks conflicted; whole-file replacement used instead
    ReplacedWholeFile,
    /// Diff could not be parsed
    Malformed,
}

/// A note about one file's diff application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyNote {
    pub file: String,
    pub kind: ApplyNoteKind,
    pub message: String,
}

/// Outcome of applying a batch of diffs.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub files: FileSet,
    /// Files whose content changed, were created or deleted
    pub changed: Vec<String>,
    pub notes: Vec<ApplyNote>,
}

impl ApplyReport {
    pub fn has_conflicts(&self) -> bool {
        self.notes
            .iter()
            .any(|n| matches!(n.kind, ApplyNoteKind::Conflict | ApplyNoteKind::MissingFile))
    }
}

/// Applies diffs to file sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffApplicator;

impl DiffApplicator {
    pub fn new() -> Self {
        Self
    }

    /// Apply diffs, returning the new file set.
    pub fn apply(&self, base: &FileSet, diffs: &[Diff]) -> FileSet {
        self.apply_with_report(base, diffs).files
    }

    /// Apply diffs, returning the new file set with per-file notes.
    pub fn apply_with_report(&self, base: &FileSet, diffs: &[Diff]) -> ApplyReport {
        let mut report = ApplyReport {
            files: base.clone(),
            ..Default::default()
        };

        for diff in diffs {
            let file = normalize_path(&diff.file);

            if diff.delete {
                if report.files.remove(&file).is_some() {
                    report.changed.push(file);
                }
                continue;
            }

            let hunks = match diff.resolved_hunks() {
                Ok(h) => h,
                Err(e) => {
                    warn!("Skipping malformed diff for {}: {}", file, e);
                    report.notes.push(ApplyNote {
                        file: file.clone(),
                        kind: ApplyNoteKind::Malformed,
                        message: e.to_string(),
                    });
                    if let Some(replacement) = &diff.replacement {
                        report.files.insert(&file, replacement.clone());
                        report.changed.push(file);
                    }
                    continue;
                }
            };

            let existing = report.files.get(&file).map(|s| s.to_string());
            let updated = match existing {
                None if diff.is_pure_addition(&hunks) => {
                    let lines: Vec<String> =
                        hunks.iter().flat_map(|h| h.new_lines.iter().cloned()).collect();
                    Some(join_lines(&lines, true))
                }
                None => match &diff.replacement {
                    Some(replacement) if hunks.is_empty() => Some(replacement.clone()),
                    Some(replacement) => {
                        report.notes.push(ApplyNote {
                            file: file.clone(),
                            kind: ApplyNoteKind::ReplacedWholeFile,
                            message: "target file missing; used whole-file content".to_string(),
                        });
                        Some(replacement.clone())
                    }
                    None => {
                        report.notes.push(ApplyNote {
                            file: file.clone(),
                            kind: ApplyNoteKind::MissingFile,
                            message: "target file does not exist".to_string(),
                        });
                        None
                    }
                },
                Some(content) if hunks.is_empty() => diff.replacement.clone().or(Some(content)),
                Some(content) => {
                    let (patched, conflicts) = apply_hunks(&content, &hunks);
                    if conflicts.is_empty() {
                        Some(patched)
                    } else if let Some(replacement) = &diff.replacement {
                        report.notes.push(ApplyNote {
                            file: file.clone(),
                            kind: ApplyNoteKind::ReplacedWholeFile,
                            message: format!(
                                "{} conflicting hunk(s); used whole-file content",
                                conflicts.len()
                            ),
                        });
                        Some(replacement.clone())
                    } else {
                        for message in conflicts {
                            report.notes.push(ApplyNote {
                                file: file.clone(),
                                kind: ApplyNoteKind::Conflict,
                                message,
                            });
                        }
                        Some(patched)
                    }
                }
            };

            if let Some(content) = updated {
                if report.files.get(&file) != Some(content.as_str()) {
                    debug!("Applied diff to {}", file);
                    report.files.insert(&file, content);
                    report.changed.push(file);
                }
            }
        }

        report
    }
}

/// Apply hunks in ascending order. Returns new content and conflict messages.
fn apply_hunks(content: &str, hunks: &[DiffHunk]) -> (String, Vec<String>) {
    let trailing_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();

    let mut ordered: Vec<&DiffHunk> = hunks.iter().collect();
    ordered.sort_by_key(|h| h.start_line);

    let mut conflicts = Vec::new();
    let mut offset: isize = 0;
    // End (exclusive, original numbering) of the last applied hunk
    let mut applied_until = 0usize;

    for hunk in ordered {
        let start = hunk.start_line.max(1) - 1;
        if start < applied_until {
            conflicts.push(format!(
                "hunk at line {} overlaps a previous hunk",
                hunk.start_line
            ));
            continue;
        }

        let Some(at) = start.checked_add_signed(offset) else {
            conflicts.push(format!("hunk at line {} is out of range", hunk.start_line));
            continue;
        };
        if at + hunk.remove_count > lines.len() {
            conflicts.push(format!(
                "hunk at line {} removes {} line(s) past end of file ({} lines)",
                hunk.start_line,
                hunk.remove_count,
                lines.len()
            ));
            continue;
        }

        if !hunk.expected.is_empty() {
            let actual = &lines[at..at + hunk.remove_count.min(hunk.expected.len())];
            let matches = hunk.expected.len() == hunk.remove_count
                && actual
                    .iter()
                    .zip(&hunk.expected)
                    .all(|(a, e)| a.trim_end() == e.trim_end());
            if !matches {
                conflicts.push(format!(
                    "hunk at line {} does not match file content",
                    hunk.start_line
                ));
                continue;
            }
        }

        lines.splice(at..at + hunk.remove_count, hunk.new_lines.iter().cloned());
        offset += hunk.new_lines.len() as isize - hunk.remove_count as isize;
        applied_until = start + hunk.remove_count;
    }

    (join_lines(&lines, trailing_newline), conflicts)
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> FileSet {
        FileSet::new().with_file("src/a.ts", "line1\nline2\nline3")
    }

    #[test]
    fn test_replace_single_line() {
        let diff = Diff::new("src/a.ts").hunk(DiffHunk::replace_line(2, "lineX"));
        let out = DiffApplicator::new().apply(&base(), &[diff]);
        assert_eq!(out.get("src/a.ts"), Some("line1\nlineX\nline3"));
    }

    #[test]
    fn test_empty_diff_list_is_identity() {
        let files = base();
        assert_eq!(DiffApplicator::new().apply(&files, &[]), files);
    }

    #[test]
    fn test_input_not_mutated() {
        let files = base();
        let diff = Diff::new("src/a.ts").hunk(DiffHunk::replace_line(1, "changed"));
        let _ = DiffApplicator::new().apply(&files, &[diff]);
        assert_eq!(files.get("src/a.ts"), Some("line1\nline2\nline3"));
    }

    #[test]
    fn test_hunks_applied_in_ascending_order_with_offsets() {
        let files = FileSet::new().with_file("f.txt", "a\nb\nc\nd\n");
        let diff = Diff::new("f.txt")
            .hunk(DiffHunk::replace_line(4, "D"))
            .hunk(DiffHunk::insert_before(2, vec!["x".into(), "y".into()]));
        let out = DiffApplicator::new().apply(&files, &[diff]);
        assert_eq!(out.get("f.txt"), Some("a\nx\ny\nb\nc\nD\n"));
    }

    #[test]
    fn test_conflicting_hunk_skipped_and_noted() {
        let diff = Diff::new("src/a.ts")
            .hunk(DiffHunk::replace_line(1, "first").expecting(vec!["line1".into()]))
            .hunk(DiffHunk::replace_line(3, "third").expecting(vec!["nope".into()]));
        let report = DiffApplicator::new().apply_with_report(&base(), &[diff]);
        assert_eq!(report.files.get("src/a.ts"), Some("first\nline2\nline3"));
        assert_eq!(report.notes.len(), 1);
        assert_eq!(report.notes[0].kind, ApplyNoteKind::Conflict);
        assert!(report.has_conflicts());
    }

    #[test]
    fn test_conflict_falls_back_to_replacement() {
        let diff = Diff::new("src/a.ts")
            .hunk(DiffHunk::replace_line(3, "x").expecting(vec!["nope".into()]))
            .with_replacement("whole\n");
        let report = DiffApplicator::new().apply_with_report(&base(), &[diff]);
        assert_eq!(report.files.get("src/a.ts"), Some("whole\n"));
        assert_eq!(report.notes[0].kind, ApplyNoteKind::ReplacedWholeFile);
    }

    #[test]
    fn test_missing_file_fails_only_that_diff() {
        let missing = Diff::new("src/missing.ts").hunk(DiffHunk::replace_line(1, "x"));
        let ok = Diff::new("src/a.ts").hunk(DiffHunk::replace_line(2, "lineX"));
        let report = DiffApplicator::new().apply_with_report(&base(), &[missing, ok]);
        assert!(!report.files.contains("src/missing.ts"));
        assert_eq!(report.files.get("src/a.ts"), Some("line1\nlineX\nline3"));
        assert_eq!(report.notes[0].kind, ApplyNoteKind::MissingFile);
    }

    #[test]
    fn test_pure_addition_creates_file() {
        let diff = Diff::new("src/new.ts").hunk(DiffHunk::insert_before(1, vec!["export {}".into()]));
        let out = DiffApplicator::new().apply(&base(), &[diff]);
        assert_eq!(out.get("src/new.ts"), Some("export {}\n"));
    }

    #[test]
    fn test_unified_diff_text() {
        let text = "--- a/src/a.ts\n+++ b/src/a.ts\n@@ -1,3 +1,3 @@\n line1\n-line2\n+lineX\n line3\n";
        let diffs = Diff::parse_unified(text).unwrap();
        assert_eq!(diffs.len(), 1);
        let out = DiffApplicator::new().apply(&base(), &diffs);
        assert_eq!(out.get("src/a.ts"), Some("line1\nlineX\nline3"));
    }

    #[test]
    fn test_unified_context_mismatch_is_conflict() {
        let text = "--- a/src/a.ts\n+++ b/src/a.ts\n@@ -1,2 +1,2 @@\n other\n-line2\n+lineX\n";
        let diffs = Diff::parse_unified(text).unwrap();
        let report = DiffApplicator::new().apply_with_report(&base(), &diffs);
        assert_eq!(report.files.get("src/a.ts"), Some("line1\nline2\nline3"));
        assert!(report.has_conflicts());
    }

    #[test]
    fn test_unified_new_and_deleted_files() {
        let text = "--- /dev/null\n+++ b/src/new.ts\n@@ -0,0 +1,2 @@\n+const a = 1;\n+export default a;\n--- a/src/a.ts\n+++ /dev/null\n@@ -1,3 +0,0 @@\n-line1\n-line2\n-line3\n";
        let diffs = Diff::parse_unified(text).unwrap();
        assert_eq!(diffs.len(), 2);
        let out = DiffApplicator::new().apply(&base(), &diffs);
        assert_eq!(out.get("src/new.ts"), Some("const a = 1;\nexport default a;\n"));
        assert!(!out.contains("src/a.ts"));
    }

    #[test]
    fn test_unified_insertion_after_line() {
        let text = "--- a/src/a.ts\n+++ b/src/a.ts\n@@ -1,0 +2,1 @@\n+inserted\n";
        let diffs = Diff::parse_unified(text).unwrap();
        let out = DiffApplicator::new().apply(&base(), &diffs);
        assert_eq!(out.get("src/a.ts"), Some("line1\ninserted\nline2\nline3"));
    }

    #[test]
    fn test_removed_comment_line_is_not_a_file_header() {
        let files = FileSet::new().with_file("db/schema.sql", "-- old note\ncreate table t (id int);\n");
        let text = "--- a/db/schema.sql\n+++ b/db/schema.sql\n@@ -1,2 +1,2 @@\n--- old note\n+-- new note\n create table t (id int);\n";
        let diffs = Diff::parse_unified(text).unwrap();
        assert_eq!(diffs.len(), 1);
        let report = DiffApplicator::new().apply_with_report(&files, &diffs);
        assert_eq!(
            report.files.get("db/schema.sql"),
            Some("-- new note\ncreate table t (id int);\n")
        );
        assert!(report.notes.is_empty());
    }

    #[test]
    fn test_hunk_cursor_tracks_counts() {
        let mut cursor = HunkCursor::default();
        assert!(cursor.is_file_header("--- a/x.sql"));
        cursor.advance("@@ -1,2 +1,1 @@");
        assert!(!cursor.is_file_header("--- dropped"));
        cursor.advance("--- dropped");
        cursor.advance(" kept");
        assert!(!cursor.in_hunk());
        assert!(cursor.is_file_header("--- a/y.sql"));
        assert!(Diff::has_file_headers("--- a/x\n+++ b/x\n"));
        assert!(!Diff::has_file_headers("@@ -1,1 +1,1 @@\n--- note\n+-- note2\n"));
    }

    #[test]
    fn test_no_headers_is_malformed() {
        assert!(Diff::parse_unified("just text").is_err());
    }
}
