//! Normalized error fingerprints.
//!
//! An [`ErrorSignature`] is only ever compared for equality across retry
//! attempts. Volatile parts of a raw error (line/column numbers, directory
//! prefixes, timestamps, build hashes, whitespace) are removed so the same
//! underlying problem yields the same signature on every attempt.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum signature length in characters.
pub const SIGNATURE_MAX_LEN: usize = 240;

/// Comparison-only fingerprint of an error message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorSignature(String);

struct Normalizers {
    ansi: Regex,
    iso_timestamp: Regex,
    clock: Regex,
    paren_position: Regex,
    colon_position: Regex,
    word_position: Regex,
    dir_prefix: Regex,
    hex_run: Regex,
}

fn normalizers() -> Option<&'static Normalizers> {
    static NORMALIZERS: OnceLock<Option<Normalizers>> = OnceLock::new();
    NORMALIZERS
        .get_or_init(|| {
            Some(Normalizers {
                ansi: Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok()?,
                iso_timestamp: Regex::new(
                    r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
                )
                .ok()?,
                clock: Regex::new(r"\b\d{1,2}:\d{2}:\d{2}(?:\.\d+)?\b").ok()?,
                paren_position: Regex::new(r"\(\d+,\s*\d+\)").ok()?,
                colon_position: Regex::new(r":\d+(?::\d+)?\b").ok()?,
                word_position: Regex::new(r"(?i)\b(?:line|ln|col|column)\s*\d+").ok()?,
                dir_prefix: Regex::new(r#"(?:[A-Za-z]:)?(?:\.{0,2}[/\\])?(?:[\w.@~\-\[\]()]+[/\\])+"#)
                    .ok()?,
                hex_run: Regex::new(r"\b[0-9a-f]{8,}\b").ok()?,
            })
        })
        .as_ref()
}

impl ErrorSignature {
    /// Derive a signature from a raw error string.
    pub fn from_raw(raw: &str) -> Self {
        let Some(n) = normalizers() else {
            return Self(collapse_whitespace(&raw.to_lowercase(), SIGNATURE_MAX_LEN));
        };

        let text = n.ansi.replace_all(raw, "");
        let text = n.iso_timestamp.replace_all(&text, "");
        let text = n.clock.replace_all(&text, "");
        let text = n.paren_position.replace_all(&text, "");
        let text = n.colon_position.replace_all(&text, "");
        let text = n.word_position.replace_all(&text, "");
        let text = n.dir_prefix.replace_all(&text, "");
        let lowered = text.to_lowercase();
        let text = n.hex_run.replace_all(&lowered, "#");

        Self(collapse_whitespace(&text, SIGNATURE_MAX_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn collapse_whitespace(text: &str, max_len: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_len).collect()
}
