//! Build and deployment log parser.
//!
//! The parser runs an ordered list of independent [`ParseRule`]s over the
//! combined log. Each rule is a `(pattern, classifier)` pair: the pattern finds
//! a known log shape and the classifier turns each match into zero or more
//! [`ParsedError`]s. Results are deduplicated by `file:line:message` so the same
//! problem reported by two tools (or twice by one tool) is recorded once.
//!
//! When no rule matches but the log clearly signals failure, a single synthetic
//! `build` error carrying the raw excerpt is emitted so that the fix step always
//! has something to work with.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::failure::excerpt;
use crate::fileset::normalize_path;

/// Error category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Typescript,
    Syntax,
    Jsx,
    Module,
    Eslint,
    Build,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typescript => "typescript",
            Self::Syntax => "syntax",
            Self::Jsx => "jsx",
            Self::Module => "module",
            Self::Eslint => "eslint",
            Self::Build => "build",
        }
    }
}

/// Error severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// A structured error extracted from a log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedError {
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
    pub severity: Severity,
    /// Machine code such as `TS2304` or an ESLint rule id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ParsedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            file: None,
            line: None,
            column: None,
            message: message.into().trim().to_string(),
            severity: Severity::Error,
            code: None,
            context: None,
        }
    }

    pub fn at(mut self, file: &str, line: Option<u32>, column: Option<u32>) -> Self {
        let file = normalize_path(file);
        if !file.is_empty() {
            self.file = Some(file);
        }
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Deduplication key: `file:line:message`.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.file.as_deref().unwrap_or(""),
            self.line.map(|l| l.to_string()).unwrap_or_default(),
            self.message
        )
    }

    /// One-line rendering used in summaries and prompts.
    pub fn display_line(&self) -> String {
        let location = match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("{}:{} ", file, line),
            (Some(file), None) => format!("{} ", file),
            _ => String::new(),
        };
        let code = self
            .code
            .as_ref()
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default();
        format!("{}[{}] {}{}", location, self.category.as_str(), self.message, code)
    }
}

/// Fast per-category flags for upstream branching.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFlags {
    pub typescript: bool,
    pub syntax: bool,
    pub jsx: bool,
    pub module: bool,
    pub eslint: bool,
    pub build: bool,
}

impl CategoryFlags {
    fn mark(&mut self, category: ErrorCategory) {
        match category {
            ErrorCategory::Typescript => self.typescript = true,
            ErrorCategory::Syntax => self.syntax = true,
            ErrorCategory::Jsx => self.jsx = true,
            ErrorCategory::Module => self.module = true,
            ErrorCategory::Eslint => self.eslint = true,
            ErrorCategory::Build => self.build = true,
        }
    }
}

/// Result of parsing a log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub errors: Vec<ParsedError>,
    pub summary: String,
    pub has_category: CategoryFlags,
}

impl ParseOutcome {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    /// Errors anchored to a file, grouped by file in first-seen order.
    pub fn by_file(&self) -> Vec<(String, Vec<&ParsedError>)> {
        let mut groups: Vec<(String, Vec<&ParsedError>)> = Vec::new();
        for error in &self.errors {
            let Some(file) = &error.file else { continue };
            match groups.iter_mut().find(|(f, _)| f == file) {
                Some((_, list)) => list.push(error),
                None => groups.push((file.clone(), vec![error])),
            }
        }
        groups
    }

    /// Whether any error points at source: anchored to a file, or of a
    /// category other than the generic `build` fallback.
    pub fn has_source_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.file.is_some() || e.category != ErrorCategory::Build)
    }

    /// Errors with no file anchor.
    pub fn unanchored(&self) -> Vec<&ParsedError> {
        self.errors.iter().filter(|e| e.file.is_none()).collect()
    }
}

/// Classifier turning one pattern match into structured errors.
pub type Classifier = fn(&Captures<'_>) -> Vec<ParsedError>;

/// One ordered parse rule.
pub struct ParseRule {
    pub name: &'static str,
    pattern: Regex,
    classify: Classifier,
}

impl ParseRule {
    /// Compile a rule; invalid patterns are logged and skipped.
    pub fn compile(name: &'static str, pattern: &str, classify: Classifier) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(pattern) => Some(Self {
                name,
                pattern,
                classify,
            }),
            Err(e) => {
                warn!("Parse rule {} has an invalid pattern: {}", name, e);
                None
            }
        }
    }

    /// Apply this rule to a log.
    pub fn apply(&self, log: &str) -> Vec<ParsedError> {
        self.pattern
            .captures_iter(log)
            .flat_map(|caps| (self.classify)(&caps))
            .collect()
    }
}

impl std::fmt::Debug for ParseRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Max errors listed in a summary.
const SUMMARY_MAX_ERRORS: usize = 10;
/// Max characters of raw log carried by a synthetic error.
const SYNTHETIC_EXCERPT_CHARS: usize = 1500;

const FAILURE_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "failure",
    "err!",
    "exited with",
    "exception",
    "fatal",
    "cannot",
    "could not",
];

/// Ordered, data-driven log parser.
#[derive(Debug)]
pub struct ErrorParser {
    rules: Arc<Vec<ParseRule>>,
    strip_prefixes: Vec<String>,
}

impl Default for ErrorParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorParser {
    /// Parser with the built-in rule list.
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
            strip_prefixes: vec!["/vercel/path0/".to_string(), "/workspace/".to_string()],
        }
    }

    /// Parser with an explicit rule list.
    pub fn with_rules(rules: Vec<ParseRule>) -> Self {
        Self {
            rules: Arc::new(rules),
            strip_prefixes: Vec::new(),
        }
    }

    /// Also strip this absolute prefix from reported file paths.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into().replace('\\', "/");
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.strip_prefixes.push(prefix);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Parse logs, emitting a synthetic error only when keywords signal failure.
    pub fn parse(&self, stdout: &str, stderr: &str) -> ParseOutcome {
        self.parse_inner(stdout, stderr, false)
    }

    /// Parse logs from a run the caller knows failed. Never returns zero errors.
    pub fn parse_failed(&self, stdout: &str, stderr: &str) -> ParseOutcome {
        self.parse_inner(stdout, stderr, true)
    }

    fn parse_inner(&self, stdout: &str, stderr: &str, asserted_failure: bool) -> ParseOutcome {
        let log = combine_logs(stdout, stderr);

        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        for rule in self.rules.iter() {
            let found = rule.apply(&log);
            if !found.is_empty() {
                debug!("Rule {} matched {} error(s)", rule.name, found.len());
            }
            for error in found {
                let error = self.clean_path(error);
                if seen.insert(error.dedup_key()) {
                    errors.push(error);
                }
            }
        }

        let has_hard_error = errors.iter().any(|e| e.severity == Severity::Error);
        if !has_hard_error && (asserted_failure || signals_failure(&log)) {
            errors.push(synthetic_error(&log));
        }

        let mut flags = CategoryFlags::default();
        for error in &errors {
            flags.mark(error.category);
        }

        ParseOutcome {
            summary: summarize(&errors),
            errors,
            has_category: flags,
        }
    }

    fn clean_path(&self, mut error: ParsedError) -> ParsedError {
        if let Some(file) = error.file.take() {
            let mut path = file.replace('\\', "/");
            for prefix in &self.strip_prefixes {
                let bare = prefix.trim_start_matches('/');
                if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                    path = rest.to_string();
                    break;
                }
                if let Some(rest) = path.strip_prefix(bare) {
                    path = rest.to_string();
                    break;
                }
            }
            let path = normalize_path(&path);
            if !path.is_empty() {
                error.file = Some(path);
            }
        }
        error
    }
}

fn combine_logs(stdout: &str, stderr: &str) -> String {
    let raw = if stdout.trim().is_empty() {
        stderr.to_string()
    } else if stderr.trim().is_empty() {
        stdout.to_string()
    } else {
        format!("{}\n{}", stdout, stderr)
    };
    strip_ansi(&raw).replace("\r\n", "\n")
}

fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' && matches!(chars.peek(), Some('[')) {
            let _ = chars.next();
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(ch);
    }
    out
}

fn signals_failure(log: &str) -> bool {
    let lower = log.to_lowercase();
    FAILURE_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn synthetic_error(log: &str) -> ParsedError {
    let relevant: Vec<&str> = log
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            FAILURE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .collect();
    let body = if relevant.is_empty() {
        let lines: Vec<&str> = log.lines().collect();
        let tail = lines.len().saturating_sub(30);
        lines[tail..].join("\n")
    } else {
        relevant.join("\n")
    };
    let body = if body.trim().is_empty() {
        "Build failed with no recognizable error output".to_string()
    } else {
        excerpt(&body, SYNTHETIC_EXCERPT_CHARS)
    };
    ParsedError::new(ErrorCategory::Build, "Build failed").with_context(body)
}

fn summarize(errors: &[ParsedError]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let mut counts: Vec<(ErrorCategory, usize)> = Vec::new();
    for error in errors {
        match counts.iter_mut().find(|(c, _)| *c == error.category) {
            Some((_, n)) => *n += 1,
            None => counts.push((error.category, 1)),
        }
    }
    let breakdown = counts
        .iter()
        .map(|(c, n)| format!("{}: {}", c.as_str(), n))
        .collect::<Vec<_>>()
        .join(", ");

    let mut summary = format!("{} error(s) ({})", errors.len(), breakdown);
    for error in errors.iter().take(SUMMARY_MAX_ERRORS) {
        summary.push('\n');
        summary.push_str(&error.display_line());
        if error.category == ErrorCategory::Build && error.file.is_none() {
            if let Some(context) = &error.context {
                summary.push('\n');
                summary.push_str(&excerpt(context, 300));
            }
        }
    }
    if errors.len() > SUMMARY_MAX_ERRORS {
        summary.push_str(&format!("\n... and {} more", errors.len() - SUMMARY_MAX_ERRORS));
    }
    summary
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn cap<'a>(caps: &'a Captures<'_>, name: &str) -> Option<&'a str> {
    caps.name(name).map(|m| m.as_str())
}

fn cap_u32(caps: &Captures<'_>, name: &str) -> Option<u32> {
    cap(caps, name).and_then(|s| s.parse().ok())
}

/// Category for a message whose tool is not known.
fn infer_category(message: &str, file: Option<&str>) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("jsx") || lower.contains("closing tag") || lower.contains("adjacent jsx") {
        ErrorCategory::Jsx
    } else if lower.contains("cannot find module")
        || lower.contains("can't resolve")
        || lower.contains("failed to resolve import")
        || lower.contains("module not found")
    {
        ErrorCategory::Module
    } else if lower.contains("unexpected token")
        || lower.contains("syntaxerror")
        || lower.contains("unterminated")
        || lower.contains("expected")
        || lower.contains("parsing error")
    {
        ErrorCategory::Syntax
    } else if lower.contains("eslint") || lower.contains("[error/") {
        ErrorCategory::Eslint
    } else if regex_ts_code(message).is_some()
        || file.map(|f| f.ends_with(".ts") || f.ends_with(".tsx")).unwrap_or(false)
    {
        ErrorCategory::Typescript
    } else {
        ErrorCategory::Build
    }
}

fn regex_ts_code(message: &str) -> Option<String> {
    let idx = message.find("TS")?;
    let digits: String = message[idx + 2..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() >= 4 {
        Some(format!("TS{}", digits))
    } else {
        None
    }
}

fn severity_of(word: Option<&str>) -> Severity {
    match word.map(|w| w.to_lowercase()) {
        Some(w) if w.starts_with("warn") => Severity::Warning,
        _ => Severity::Error,
    }
}

fn classify_tsc(caps: &Captures<'_>) -> Vec<ParsedError> {
    let (Some(path), Some(msg)) = (cap(caps, "path"), cap(caps, "msg")) else {
        return Vec::new();
    };
    let mut error = ParsedError::new(ErrorCategory::Typescript, msg)
        .at(path, cap_u32(caps, "line"), cap_u32(caps, "col"))
        .with_severity(severity_of(cap(caps, "sev")));
    if let Some(code) = cap(caps, "code") {
        error = error.with_code(code);
        if msg.contains("Cannot find module") && code == "TS2307" {
            error.category = ErrorCategory::Module;
        }
    }
    vec![error]
}

fn classify_file_anchored(caps: &Captures<'_>) -> Vec<ParsedError> {
    let (Some(path), Some(msg)) = (cap(caps, "path"), cap(caps, "msg")) else {
        return Vec::new();
    };
    let msg = msg
        .trim_start_matches("error:")
        .trim_start_matches("Error:")
        .trim();
    let category = infer_category(msg, Some(path));
    let mut error = ParsedError::new(category, msg)
        .at(path, cap_u32(caps, "line"), cap_u32(caps, "col"))
        .with_severity(severity_of(cap(caps, "sev")));
    if let Some(code) = regex_ts_code(msg) {
        error = error.with_code(code);
    }
    vec![error]
}

fn classify_pointer(caps: &Captures<'_>) -> Vec<ParsedError> {
    let (Some(path), Some(msg)) = (cap(caps, "path"), cap(caps, "msg")) else {
        return Vec::new();
    };
    let category = match infer_category(msg, None) {
        ErrorCategory::Build => ErrorCategory::Syntax,
        other => other,
    };
    vec![ParsedError::new(category, msg).at(path, cap_u32(caps, "line"), cap_u32(caps, "col"))]
}

fn classify_module_not_found(caps: &Captures<'_>) -> Vec<ParsedError> {
    let Some(module) = cap(caps, "module") else {
        return Vec::new();
    };
    let mut error = ParsedError::new(
        ErrorCategory::Module,
        format!("Cannot resolve module '{}'", module),
    )
    .with_context(module.to_string());
    if let Some(path) = cap(caps, "path") {
        error = error.at(path, cap_u32(caps, "line"), cap_u32(caps, "col"));
    }
    vec![error]
}

fn classify_import_export(caps: &Captures<'_>) -> Vec<ParsedError> {
    let Some(msg) = cap(caps, "msg") else {
        return Vec::new();
    };
    let mut error = ParsedError::new(ErrorCategory::Syntax, msg);
    if let Some(module) = cap(caps, "module") {
        error = error.with_context(module.to_string());
    }
    if let Some(path) = cap(caps, "path") {
        error = error.at(path, cap_u32(caps, "line"), cap_u32(caps, "col"));
    }
    vec![error]
}

fn eslint_detail() -> Option<&'static Regex> {
    static DETAIL: OnceLock<Option<Regex>> = OnceLock::new();
    DETAIL
        .get_or_init(|| {
            Regex::new(
                r"^\s*(?P<line>\d+):(?P<col>\d+)\s+(?P<sev>[Ee]rror|[Ww]arning):?\s+(?P<msg>.+?)(?:\s{2,}(?P<rule>[@\w/\-]+))?\s*$",
            )
            .ok()
        })
        .as_ref()
}

fn classify_eslint_block(caps: &Captures<'_>) -> Vec<ParsedError> {
    let (Some(path), Some(body)) = (cap(caps, "path"), cap(caps, "body")) else {
        return Vec::new();
    };
    let Some(detail) = eslint_detail() else {
        return Vec::new();
    };
    body.lines()
        .filter_map(|line| detail.captures(line))
        .filter_map(|d| {
            let msg = cap(&d, "msg")?;
            let mut error = ParsedError::new(ErrorCategory::Eslint, msg)
                .at(path.trim(), cap_u32(&d, "line"), cap_u32(&d, "col"))
                .with_severity(severity_of(cap(&d, "sev")));
            if let Some(rule) = cap(&d, "rule") {
                error = error.with_code(rule);
            }
            Some(error)
        })
        .collect()
}

fn classify_eslint_config(caps: &Captures<'_>) -> Vec<ParsedError> {
    let Some(msg) = cap(caps, "msg") else {
        return Vec::new();
    };
    let mut error = ParsedError::new(ErrorCategory::Eslint, msg).with_code("eslint-config");
    if let Some(name) = cap(caps, "name") {
        error = error.with_context(name.to_string());
    }
    vec![error]
}

fn classify_build_command(caps: &Captures<'_>) -> Vec<ParsedError> {
    let Some(msg) = cap(caps, "msg") else {
        return Vec::new();
    };
    let mut error = ParsedError::new(ErrorCategory::Build, msg);
    if let Some(code) = cap(caps, "code") {
        error = error.with_code(format!("exit {}", code));
    }
    vec![error]
}

fn classify_framework(caps: &Captures<'_>) -> Vec<ParsedError> {
    let (Some(path), Some(kind), Some(msg)) = (cap(caps, "path"), cap(caps, "kind"), cap(caps, "msg"))
    else {
        return Vec::new();
    };
    let category = match kind {
        "Type error" => ErrorCategory::Typescript,
        "Syntax error" if msg.to_lowercase().contains("jsx") => ErrorCategory::Jsx,
        "Syntax error" => ErrorCategory::Syntax,
        _ => infer_category(msg, Some(path)),
    };
    vec![ParsedError::new(category, msg).at(path, cap_u32(caps, "line"), cap_u32(caps, "col"))]
}

fn classify_vite_resolve(caps: &Captures<'_>) -> Vec<ParsedError> {
    let (Some(module), Some(path)) = (cap(caps, "module"), cap(caps, "path")) else {
        return Vec::new();
    };
    vec![ParsedError::new(
        ErrorCategory::Module,
        format!("Cannot resolve module '{}'", module),
    )
    .at(path, None, None)
    .with_context(module.to_string())]
}

/// The built-in rules, compiled once and shared by every parser.
fn builtin_rules() -> Arc<Vec<ParseRule>> {
    static RULES: OnceLock<Arc<Vec<ParseRule>>> = OnceLock::new();
    RULES.get_or_init(|| Arc::new(default_rules())).clone()
}

/// The built-in rule list, in evaluation order.
pub fn default_rules() -> Vec<ParseRule> {
    const PATH: &str = r"[\w./\\@\-\[\]()~]+\.(?:tsx?|jsx?|mjs|cjs|mts|cts|vue|svelte|css|scss|json)";
    [
        // src/a.ts(12,5): error TS2304: Cannot find name 'x'.
        // src/a.ts:12:5 - error TS2304: Cannot find name 'x'.
        ParseRule::compile(
            "typescript",
            &format!(
                r"(?m)^[ \t]*(?P<path>{p})(?:\((?P<line>\d+),(?P<col>\d+)\)|:(?P<line2>\d+):(?P<col2>\d+)[ \t]+-)[ \t]*:?[ \t]*(?P<sev>error|warning)[ \t]+(?P<code>TS\d+):[ \t]*(?P<msg>.+)$",
                p = PATH
            ),
            |caps| {
                let mut errors = classify_tsc(caps);
                if let Some(error) = errors.first_mut() {
                    if error.line.is_none() {
                        error.line = cap_u32(caps, "line2");
                        error.column = cap_u32(caps, "col2");
                    }
                }
                errors
            },
        ),
        // src/a.ts:12:5: error: message
        ParseRule::compile(
            "file_anchored",
            &format!(
                r"(?m)^[ \t]*(?:-->[ \t]*)?(?P<path>{p}):(?P<line>\d+):(?P<col>\d+):[ \t]*(?:(?P<sev>[Ee]rror|[Ww]arning):[ \t]*)?(?P<msg>\S.*)$",
                p = PATH
            ),
            classify_file_anchored,
        ),
        // ✘ [ERROR] Expected ";" but found "x"
        //
        //     src/index.ts:3:10:
        ParseRule::compile(
            "esbuild_pointer",
            &format!(
                r"(?m)\[ERROR\]\s*(?P<msg>[^\n]+)\n(?:[ \t]*\n)*[ \t]+(?P<path>{p}):(?P<line>\d+):(?P<col>\d+):",
                p = PATH
            ),
            classify_pointer,
        ),
        //   × Unexpected token `div`. Expected jsx identifier
        //    ╭─[src/app/page.tsx:12:5]
        ParseRule::compile(
            "swc_pointer",
            &format!(
                r"(?m)^[ \t]*[×x][ \t]+(?P<msg>[^\n]+)\n(?:[^\n]*\n){{0,3}}?\s*╭─\[(?P<path>{p}):(?P<line>\d+):(?P<col>\d+)\]",
                p = PATH
            ),
            classify_pointer,
        ),
        // Module not found: Can't resolve 'x' in '/app/src'
        ParseRule::compile(
            "module_not_found",
            &format!(
                r"(?m)(?:^[ \t]*(?P<path>{p}):(?P<line>\d+):(?P<col>\d+)[ \t]*\n)?^[ \t]*Module not found: (?:Error: )?Can't resolve '(?P<module>[^']+)'",
                p = PATH
            ),
            classify_module_not_found,
        ),
        // Error: Cannot find module 'x'
        ParseRule::compile(
            "cannot_find_module",
            r"(?m)^[ \t]*(?:Error:[ \t]*)?Cannot find module '(?P<module>[^']+)'",
            classify_module_not_found,
        ),
        ParseRule::compile(
            "vite_resolve",
            r#"Rollup failed to resolve import "(?P<module>[^"]+)" from "(?P<path>[^"]+)""#,
            classify_vite_resolve,
        ),
        // Attempted import error: 'x' is not exported from 'y'.
        ParseRule::compile(
            "import_export",
            r"(?m)(?P<msg>(?:Attempted import error: '[^']+' is not exported from '(?P<module>[^']+)'[^\n]*|SyntaxError: The requested module '(?P<module2>[^']+)' does not provide an export named '[^']+'|SyntaxError: Cannot use import statement outside a module|SyntaxError: Unexpected token 'export'))",
            |caps| {
                let mut errors = classify_import_export(caps);
                if let (Some(error), Some(module)) = (errors.first_mut(), cap(caps, "module2")) {
                    error.context = Some(module.to_string());
                }
                errors
            },
        ),
        // ./src/app/page.tsx
        // 12:5  Error: 'x' is defined but never used.  @typescript-eslint/no-unused-vars
        ParseRule::compile(
            "eslint_rule",
            &format!(
                r"(?m)^(?P<path>\.?/?{p})[ \t]*\n(?P<body>(?:[ \t]*\d+:\d+[ \t]+[^\n]*(?:\n|$))+)",
                p = PATH
            ),
            classify_eslint_block,
        ),
        ParseRule::compile(
            "eslint_config",
            r#"(?m)(?P<msg>(?:ESLint couldn't find the config "(?P<name>[^"]+)"[^\n]*|Failed to load (?:config|plugin) ["'](?P<name2>[^"']+)["'][^\n]*|ESLint: [^\n]*[Ii]nvalid [^\n]*|Invalid Options:[^\n]*))"#,
            |caps| {
                let mut errors = classify_eslint_config(caps);
                if let (Some(error), Some(name)) = (errors.first_mut(), cap(caps, "name2")) {
                    error.context = Some(name.to_string());
                }
                errors
            },
        ),
        // Error: Command "npm run build" exited with 1
        ParseRule::compile(
            "build_command",
            r#"(?m)(?P<msg>(?:Error: )?Command "[^"]+" exited with (?P<code>\d+)|error Command failed with exit code (?P<code2>\d+)|npm ERR! code [A-Z_]+|Build failed because of webpack errors|ELIFECYCLE[^\n]*)"#,
            |caps| {
                let mut errors = classify_build_command(caps);
                if let (Some(error), Some(code)) = (errors.first_mut(), cap(caps, "code2")) {
                    error.code = Some(format!("exit {}", code));
                }
                errors
            },
        ),
        // Failed to compile.
        //
        // ./src/app/page.tsx:12:5
        // Type error: Property 'x' does not exist on type 'Y'.
        ParseRule::compile(
            "framework_wrapped",
            &format!(
                r"(?m)^[ \t]*(?P<path>{p}):(?P<line>\d+):(?P<col>\d+)[ \t]*\n(?P<kind>Type error|Syntax error|Error):\s*(?P<msg>[^\n]+)",
                p = PATH
            ),
            classify_framework,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(log: &str) -> ParseOutcome {
        ErrorParser::new().parse(log, "")
    }

    #[test]
    fn test_tsc_paren_format() {
        let out = parse("src/app.ts(12,5): error TS2304: Cannot find name 'foo'.");
        assert_eq!(out.errors.len(), 1);
        let e = &out.errors[0];
        assert_eq!(e.category, ErrorCategory::Typescript);
        assert_eq!(e.file.as_deref(), Some("src/app.ts"));
        assert_eq!(e.line, Some(12));
        assert_eq!(e.column, Some(5));
        assert_eq!(e.code.as_deref(), Some("TS2304"));
        assert!(out.has_category.typescript);
    }

    #[test]
    fn test_tsc_pretty_format() {
        let out = parse("./src/lib/util.ts:3:7 - error TS2322: Type 'string' is not assignable to type 'number'.");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].file.as_deref(), Some("src/lib/util.ts"));
        assert_eq!(out.errors[0].line, Some(3));
    }

    #[test]
    fn test_tsc_missing_module_is_module_category() {
        let out = parse("src/a.tsx(1,22): error TS2307: Cannot find module 'react-icons/fa' or its corresponding type declarations.");
        assert_eq!(out.errors[0].category, ErrorCategory::Module);
        assert!(out.has_category.module);
    }

    #[test]
    fn test_duplicates_collapse() {
        let line = "src/app.ts(12,5): error TS2304: Cannot find name 'foo'.\n";
        let out = parse(&line.repeat(5));
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn test_file_anchored_generic() {
        let out = parse("src/main.jsx:4:10: error: Unexpected token, expected \",\"");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].category, ErrorCategory::Syntax);
        assert_eq!(out.errors[0].line, Some(4));
    }

    #[test]
    fn test_esbuild_pointer() {
        let log = "✘ [ERROR] Expected \";\" but found \"x\"\n\n    src/index.ts:3:10:\n      3 │ const a = 1 x\n";
        let out = parse(log);
        let e = out
            .errors
            .iter()
            .find(|e| e.file.as_deref() == Some("src/index.ts"))
            .unwrap();
        assert_eq!(e.category, ErrorCategory::Syntax);
        assert_eq!(e.line, Some(3));
    }

    #[test]
    fn test_swc_pointer_jsx() {
        let log = "  × Unexpected token `div`. Expected jsx identifier\n   ╭─[src/app/page.tsx:12:5]\n";
        let out = parse(log);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].category, ErrorCategory::Jsx);
        assert_eq!(out.errors[0].file.as_deref(), Some("src/app/page.tsx"));
    }

    #[test]
    fn test_module_not_found_with_location() {
        let log = "./src/app/page.tsx:3:1\nModule not found: Can't resolve 'framer-motion'\n";
        let out = parse(log);
        let e = out
            .errors
            .iter()
            .find(|e| e.category == ErrorCategory::Module)
            .unwrap();
        assert_eq!(e.file.as_deref(), Some("src/app/page.tsx"));
        assert_eq!(e.context.as_deref(), Some("framer-motion"));
    }

    #[test]
    fn test_import_export_error() {
        let out = parse("Attempted import error: 'Foo' is not exported from './components'.");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].category, ErrorCategory::Syntax);
    }

    #[test]
    fn test_eslint_block() {
        let log = "./src/app/page.tsx\n12:7  Error: 'unused' is assigned a value but never used.  @typescript-eslint/no-unused-vars\n20:1  Warning: Missing return type.  @typescript-eslint/explicit-function-return-type\n";
        let out = parse(log);
        let eslint: Vec<_> = out
            .errors
            .iter()
            .filter(|e| e.category == ErrorCategory::Eslint)
            .collect();
        assert_eq!(eslint.len(), 2);
        assert_eq!(eslint[0].file.as_deref(), Some("src/app/page.tsx"));
        assert_eq!(eslint[0].code.as_deref(), Some("@typescript-eslint/no-unused-vars"));
        assert_eq!(eslint[1].severity, Severity::Warning);
    }

    #[test]
    fn test_eslint_config_error() {
        let out = parse("ESLint couldn't find the config \"next/core-web-vitals\" to extend from.");
        assert_eq!(out.errors[0].category, ErrorCategory::Eslint);
        assert_eq!(out.errors[0].context.as_deref(), Some("next/core-web-vitals"));
    }

    #[test]
    fn test_framework_wrapped() {
        let log = "Failed to compile.\n\n./src/app/page.tsx:12:5\nType error: Property 'x' does not exist on type 'Y'.\n";
        let out = parse(log);
        let e = out
            .errors
            .iter()
            .find(|e| e.category == ErrorCategory::Typescript)
            .unwrap();
        assert_eq!(e.file.as_deref(), Some("src/app/page.tsx"));
        assert_eq!(e.line, Some(12));
    }

    #[test]
    fn test_build_command_failure() {
        let out = parse("Error: Command \"npm run build\" exited with 1");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].category, ErrorCategory::Build);
        assert_eq!(out.errors[0].code.as_deref(), Some("exit 1"));
    }

    #[test]
    fn test_synthetic_when_keywords_present() {
        let out = parse("something went badly: fatal problem in pipeline");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].category, ErrorCategory::Build);
        assert!(out.has_category.build);
    }

    #[test]
    fn test_clean_log_has_no_errors() {
        let out = parse("Compiled successfully in 2.1s\nRoute (app) Size");
        assert!(out.is_empty());
        assert!(out.summary.is_empty());
    }

    #[test]
    fn test_asserted_failure_never_empty() {
        let out = ErrorParser::new().parse_failed("", "");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].category, ErrorCategory::Build);
    }

    #[test]
    fn test_source_errors_versus_generic_failure() {
        let typed = parse("./src/a.tsx:3:7\nType error: Argument of type 'string' is not assignable.\n> 3 | setTimeout(tick, 'soon');\n");
        assert!(typed.has_source_errors());
        let generic = ErrorParser::new().parse_failed("npm ERR! network request to registry timed out", "");
        assert!(!generic.has_source_errors());
    }

    #[test]
    fn test_builtin_rules_compiled_once() {
        let a = ErrorParser::new();
        let b = ErrorParser::new().strip_prefix("/tmp/x");
        assert!(Arc::ptr_eq(&a.rules, &b.rules));
        assert!(eslint_detail().is_some());
    }

    #[test]
    fn test_prefix_stripping() {
        let parser = ErrorParser::new().strip_prefix("/tmp/scratch-123");
        let out = parser.parse("/tmp/scratch-123/src/a.ts(1,1): error TS1005: ';' expected.", "");
        assert_eq!(out.errors[0].file.as_deref(), Some("src/a.ts"));
    }

    #[test]
    fn test_windows_paths_normalized() {
        let out = parse(".\\src\\a.ts(1,1): error TS1005: ';' expected.");
        assert_eq!(out.errors[0].file.as_deref(), Some("src/a.ts"));
    }

    #[test]
    fn test_by_file_grouping() {
        let log = "src/a.ts(1,1): error TS1005: ';' expected.\nsrc/b.ts(2,1): error TS1005: ';' expected.\nsrc/a.ts(9,1): error TS2304: Cannot find name 'z'.\n";
        let out = parse(log);
        let groups = out.by_file();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "src/a.ts");
        assert_eq!(groups[0].1.len(), 2);
    }
}
