//! Failure taxonomy for the build and deploy loops.
//!
//! Loops classify every failure into a [`FailureKind`] and report a compact
//! [`Diagnostic`] upward. Only the Job Controller turns diagnostics into job
//! status.

use serde::{Deserialize, Serialize};

/// Classification of a loop failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network/timeout class; retried without a fix
    TransientInfra,
    /// Compiler, linter or module error; routed through the fix loop
    ContentBuild,
    /// Same error signature repeated past the threshold
    Stuck,
    /// Attempts used up without stuck detection
    ExhaustedRetries,
    /// Fix response could not be turned into diffs or files
    PatchParseFailure,
    /// Generation service refused or failed the fix request
    GenerationFailed,
}

impl FailureKind {
    /// Whether this kind ends a loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stuck | Self::ExhaustedRetries | Self::GenerationFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientInfra => "transient_infra",
            Self::ContentBuild => "content_build",
            Self::Stuck => "stuck",
            Self::ExhaustedRetries => "exhausted_retries",
            Self::PatchParseFailure => "patch_parse_failure",
            Self::GenerationFailed => "generation_failed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline phase a diagnostic came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Generation,
    Build,
    Prerequisite,
    Deploy,
}

/// Compact description of why a loop stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: FailureKind,
    pub phase: Phase,
    /// Attempts or iterations consumed
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Max characters kept from a raw error in a diagnostic.
pub const EXCERPT_MAX_CHARS: usize = 2000;

impl Diagnostic {
    pub fn new(kind: FailureKind, phase: Phase, attempts: u32) -> Self {
        Self {
            kind,
            phase,
            attempts,
            signature: None,
            last_error: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_last_error(mut self, error: &str) -> Self {
        self.last_error = Some(excerpt(error, EXCERPT_MAX_CHARS));
        self
    }
}

/// Truncate text to at most `max_chars` characters on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("…");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = excerpt(&text, 4);
        assert_eq!(cut, "éééé…");
        assert_eq!(excerpt("  short  ", 10), "short");
    }

    #[test]
    fn test_stuck_and_exhausted_are_distinct() {
        let stuck = Diagnostic::new(FailureKind::Stuck, Phase::Deploy, 3);
        let exhausted = Diagnostic::new(FailureKind::ExhaustedRetries, Phase::Deploy, 4);
        assert_ne!(stuck.kind, exhausted.kind);
        let json = serde_json::to_value(&stuck).unwrap();
        assert_eq!(json["kind"], "stuck");
        assert!(FailureKind::Stuck.is_terminal());
        assert!(!FailureKind::TransientInfra.is_terminal());
    }
}
