//! # shipwright_core
//!
//! Core model and pure algorithms for the Shipwright generation-to-deployment
//! pipeline.
//!
//! This crate has no network or process dependencies. It provides:
//!
//! - **Model**: jobs, file snapshots, diffs, parsed errors, deployment attempts
//! - **Error Parser**: ordered rule list turning build/deploy logs into
//!   structured, deduplicated errors
//! - **Signatures**: normalized fingerprints used to detect "stuck" loops
//! - **Diff Applicator**: hunk and unified-diff application with conflict notes
//! - **Retry Machine**: the transition table shared by the build and deploy loops
//! - **Collaborators**: persistence and notification traits plus an in-memory store
//!
//! ## Architecture
//!
//! ```text
//!   build/deploy log ──▶ ErrorParser ──▶ ParseOutcome ──▶ ErrorSignature
//!                                            │                  │
//!                                            ▼                  ▼
//!   FileSet ──▶ DiffApplicator ◀── Diff   RetryMachine (Attempting → Success |
//!                                                      Retrying | FixingContent |
//!                                                      Stuck | Exhausted)
//! ```

pub mod config;
pub mod deployment;
pub mod diff;
pub mod error;
pub mod failure;
pub mod fileset;
pub mod job;
pub mod machine;
pub mod parser;
pub mod signature;
pub mod store;

pub use config::{
    BuildConfig, DeployConfig, GenerationConfig, ModelTier, ProviderKind, RunnerKind,
    ShipwrightConfig, StoreConfig, TemplatesConfig,
};
pub use deployment::{AttemptStatus, DeploymentAttempt, DeploymentRecord};
pub use diff::{ApplyNote, ApplyNoteKind, ApplyReport, Diff, DiffApplicator, DiffHunk, HunkCursor};
pub use error::{CoreError, CoreResult};
pub use failure::{excerpt, Diagnostic, FailureKind, Phase};
pub use fileset::{normalize_path, FileSet};
pub use job::{
    GenerationJob, JobCheckpoint, JobErrorPayload, JobKind, JobOutcome, JobStage, JobStatus,
    UsageTotals,
};
pub use machine::{AttemptOutcome, LoopState, RetryMachine, RetryPolicy};
pub use parser::{CategoryFlags, ErrorCategory, ErrorParser, ParseOutcome, ParseRule, ParsedError, Severity};
pub use signature::ErrorSignature;
pub use store::{
    InMemoryStore, JobStore, Notification, NotificationKind, Notifier, NullNotifier,
    ProjectStore,
};
