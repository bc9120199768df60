//! Substring heuristics separating infrastructure hiccups from content failures.

/// Lowercase markers of a transient infrastructure failure.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "etimedout",
    "econnreset",
    "econnrefused",
    "connection reset",
    "connection refused",
    "socket hang up",
    "network error",
    "eai_again",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway",
    "temporarily unavailable",
    "rate limit",
    "too many requests",
    "internal server error",
];

/// Classifies failure messages as transient.
#[derive(Debug, Clone)]
pub struct TransientClassifier {
    markers: Vec<String>,
}

impl Default for TransientClassifier {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl TransientClassifier {
    /// Built-in markers plus `extra` (matched case-insensitively).
    pub fn new(extra: &[String]) -> Self {
        let markers = TRANSIENT_MARKERS
            .iter()
            .map(|m| m.to_string())
            .chain(extra.iter().map(|m| m.to_lowercase()))
            .filter(|m| !m.is_empty())
            .collect();
        Self { markers }
    }

    pub fn is_transient(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.markers.iter().any(|m| lowered.contains(m.as_str()))
    }
}
