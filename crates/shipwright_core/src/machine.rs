//! Retry state machine shared by the build and deploy loops.
//!
//! ```text
//!   Ready ──▶ Attempting ──▶ Success
//!                 │  ▲
//!                 │  └──── Retrying        (transient failure, no fix)
//!                 │  └──── FixingContent   (content failure, fix requested)
//!                 ├──▶ Stuck              (same signature `stuck_threshold` times in a row)
//!                 └──▶ Exhausted          (attempt budget used up)
//! ```
//!
//! Stuck takes precedence over Exhausted when both hold on the same attempt.
//! Transient failures consume an attempt but leave the signature streak alone.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::failure::{Diagnostic, FailureKind, Phase};
use crate::signature::ErrorSignature;

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Ready,
    Attempting,
    Success,
    Retrying,
    FixingContent,
    Stuck,
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Stuck | Self::Exhausted)
    }

    /// Transition table.
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (Ready, Attempting)
                | (Retrying, Attempting)
                | (FixingContent, Attempting)
                | (Attempting, Success)
                | (Attempting, Retrying)
                | (Attempting, FixingContent)
                | (Attempting, Stuck)
                | (Attempting, Exhausted)
        )
    }
}

/// What happened on one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    /// Network/timeout class failure
    TransientFailure,
    /// Content failure with its normalized signature
    ContentFailure(ErrorSignature),
}

/// Attempt budget and stuck threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Consecutive identical content signatures that mean "stuck"
    pub stuck_threshold: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, stuck_threshold: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            stuck_threshold: stuck_threshold.max(1),
        }
    }

    /// Local build loop defaults: 3 iterations, stuck on the 2nd identical error.
    pub fn build() -> Self {
        Self::new(3, 2)
    }

    /// Deployment loop defaults: 4 attempts, stuck on the 3rd identical error.
    pub fn deploy() -> Self {
        Self::new(4, 3)
    }
}

/// Tracks attempts and the content-failure signature streak.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: LoopState,
    attempts: u32,
    streak: u32,
    last_signature: Option<ErrorSignature>,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: LoopState::Ready,
            attempts: 0,
            streak: 0,
            last_signature: None,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consecutive occurrences of the last content signature.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn last_signature(&self) -> Option<&ErrorSignature> {
        self.last_signature.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, next: LoopState) -> CoreResult<LoopState> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidState(format!(
                "{:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, attempt = self.attempts, "Loop transition");
        self.state = next;
        Ok(next)
    }

    /// Start the next attempt, returning its 1-based number.
    pub fn begin_attempt(&mut self) -> CoreResult<u32> {
        if self.attempts >= self.policy.max_attempts {
            return Err(CoreError::InvalidState(format!(
                "attempt budget of {} already used",
                self.policy.max_attempts
            )));
        }
        self.transition(LoopState::Attempting)?;
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Record the outcome of the current attempt and move to the next state.
    pub fn record(&mut self, outcome: AttemptOutcome) -> CoreResult<LoopState> {
        if self.state != LoopState::Attempting {
            return Err(CoreError::InvalidState(format!(
                "no attempt in progress (state {:?})",
                self.state
            )));
        }
        let budget_left = self.attempts < self.policy.max_attempts;
        let next = match outcome {
            AttemptOutcome::Succeeded => LoopState::Success,
            AttemptOutcome::TransientFailure if budget_left => LoopState::Retrying,
            AttemptOutcome::TransientFailure => LoopState::Exhausted,
            AttemptOutcome::ContentFailure(signature) => {
                if self.last_signature.as_ref() == Some(&signature) {
                    self.streak += 1;
                } else {
                    self.streak = 1;
                    self.last_signature = Some(signature);
                }
                if self.streak >= self.policy.stuck_threshold {
                    LoopState::Stuck
                } else if budget_left {
                    LoopState::FixingContent
                } else {
                    LoopState::Exhausted
                }
            }
        };
        self.transition(next)
    }

    /// Diagnostic for a loop that stopped without success.
    ///
    /// Returns `None` while the loop is still running or after success.
    pub fn stop_diagnostic(&self, phase: Phase, last_error: &str) -> Option<Diagnostic> {
        let diagnostic = match self.state {
            LoopState::Stuck => {
                let diagnostic = Diagnostic::new(FailureKind::Stuck, phase, self.attempts);
                match &self.last_signature {
                    Some(signature) => diagnostic.with_signature(signature.as_str()),
                    None => diagnostic,
                }
            }
            LoopState::Exhausted => {
                Diagnostic::new(FailureKind::ExhaustedRetries, phase, self.attempts)
            }
            _ => return None,
        };
        Some(diagnostic.with_last_error(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(s: &str) -> AttemptOutcome {
        AttemptOutcome::ContentFailure(ErrorSignature::from_raw(s))
    }

    #[test]
    fn test_transition_table() {
        assert!(LoopState::Ready.can_transition_to(LoopState::Attempting));
        assert!(LoopState::Attempting.can_transition_to(LoopState::Stuck));
        assert!(!LoopState::Ready.can_transition_to(LoopState::Success));
        assert!(!LoopState::Success.can_transition_to(LoopState::Attempting));
        assert!(!LoopState::Stuck.can_transition_to(LoopState::Attempting));
        assert!(!LoopState::Retrying.can_transition_to(LoopState::Success));
    }

    #[test]
    fn test_transient_then_success() {
        let mut m = RetryMachine::new(RetryPolicy::deploy());
        m.begin_attempt().unwrap();
        assert_eq!(m.record(AttemptOutcome::TransientFailure).unwrap(), LoopState::Retrying);
        m.begin_attempt().unwrap();
        assert_eq!(m.record(AttemptOutcome::Succeeded).unwrap(), LoopState::Success);
        assert_eq!(m.attempts(), 2);
        assert!(m.is_done());
    }

    #[test]
    fn test_stuck_on_third_identical_signature() {
        let mut m = RetryMachine::new(RetryPolicy::deploy());
        for expected in [LoopState::FixingContent, LoopState::FixingContent, LoopState::Stuck] {
            m.begin_attempt().unwrap();
            assert_eq!(m.record(sig("Module not found: 'x'")).unwrap(), expected);
        }
        assert_eq!(m.attempts(), 3);
        assert_eq!(m.streak(), 3);
        assert!(m.begin_attempt().is_err());
    }

    #[test]
    fn test_changing_signature_resets_streak() {
        let mut m = RetryMachine::new(RetryPolicy::deploy());
        m.begin_attempt().unwrap();
        m.record(sig("error a")).unwrap();
        m.begin_attempt().unwrap();
        m.record(sig("error a")).unwrap();
        m.begin_attempt().unwrap();
        assert_eq!(m.record(sig("error b")).unwrap(), LoopState::FixingContent);
        assert_eq!(m.streak(), 1);
        m.begin_attempt().unwrap();
        assert_eq!(m.record(sig("error c")).unwrap(), LoopState::Exhausted);
    }

    #[test]
    fn test_transient_does_not_break_streak() {
        let mut m = RetryMachine::new(RetryPolicy::new(5, 3));
        m.begin_attempt().unwrap();
        m.record(sig("same")).unwrap();
        m.begin_attempt().unwrap();
        m.record(AttemptOutcome::TransientFailure).unwrap();
        m.begin_attempt().unwrap();
        m.record(sig("same")).unwrap();
        m.begin_attempt().unwrap();
        assert_eq!(m.record(sig("same")).unwrap(), LoopState::Stuck);
    }

    #[test]
    fn test_stuck_wins_over_exhausted() {
        let mut m = RetryMachine::new(RetryPolicy::build());
        m.begin_attempt().unwrap();
        m.record(sig("boom")).unwrap();
        m.begin_attempt().unwrap();
        assert_eq!(m.record(sig("boom")).unwrap(), LoopState::Stuck);

        let mut m = RetryMachine::new(RetryPolicy::new(2, 2));
        m.begin_attempt().unwrap();
        m.record(sig("a")).unwrap();
        m.begin_attempt().unwrap();
        assert_eq!(m.record(sig("a")).unwrap(), LoopState::Stuck);
    }

    #[test]
    fn test_stop_diagnostic() {
        let mut m = RetryMachine::new(RetryPolicy::build());
        assert!(m.stop_diagnostic(Phase::Build, "").is_none());
        m.begin_attempt().unwrap();
        m.record(sig("boom")).unwrap();
        m.begin_attempt().unwrap();
        m.record(sig("boom")).unwrap();
        let diagnostic = m.stop_diagnostic(Phase::Build, "boom at line 3").unwrap();
        assert_eq!(diagnostic.kind, FailureKind::Stuck);
        assert_eq!(diagnostic.attempts, 2);
        assert_eq!(diagnostic.signature.as_deref(), Some("boom"));
        assert_eq!(diagnostic.last_error.as_deref(), Some("boom at line 3"));
    }

    #[test]
    fn test_record_without_attempt_is_error() {
        let mut m = RetryMachine::new(RetryPolicy::build());
        assert!(m.record(AttemptOutcome::Succeeded).is_err());
    }
}
