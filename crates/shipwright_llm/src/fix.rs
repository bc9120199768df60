//! Fix requests shared by the build and deploy loops.

use tracing::{info, warn};

use shipwright_core::{ApplyReport, FileSet, ModelTier, ParseOutcome, Phase};

use crate::error::{LlmError, LlmResult};
use crate::gateway::GenerationGateway;
use crate::patch::Patch;
use crate::prompt::{build_fix_prompt, fix_system_prompt};

/// Result of asking the gateway for a fix.
#[derive(Debug, Clone)]
pub enum FixOutcome {
    /// Response parsed and applied to the file set
    Applied(ApplyReport),
    /// Response could not be parsed; files unchanged
    Unparseable(String),
}

impl FixOutcome {
    /// The resulting file set (unchanged when unparseable).
    pub fn files_or(self, base: &FileSet) -> FileSet {
        match self {
            Self::Applied(report) => report.files,
            Self::Unparseable(_) => base.clone(),
        }
    }
}

/// Ask for a fix of the parsed errors and apply it.
///
/// Gateway failures are returned as errors; an unparseable response is a
/// [`FixOutcome::Unparseable`] so the caller can treat it as a no-op iteration.
pub async fn request_fix(
    gateway: &GenerationGateway,
    files: &FileSet,
    outcome: &ParseOutcome,
    phase: Phase,
) -> LlmResult<FixOutcome> {
    let call_site = match phase {
        Phase::Build => "build_fix",
        Phase::Deploy => "deploy_fix",
        Phase::Prerequisite => "prerequisite_fix",
        Phase::Generation => "generate",
    };
    let prompt = build_fix_prompt(files, outcome, phase);
    let response = gateway
        .complete_for(call_site, &fix_system_prompt(), &prompt, ModelTier::Primary)
        .await?;

    match Patch::parse(&response) {
        Ok(patch) => {
            let paths = patch.paths();
            let report = patch.apply(files);
            info!(
                call_site,
                touched = paths.len(),
                changed = report.changed.len(),
                notes = report.notes.len(),
                "Applied fix"
            );
            Ok(FixOutcome::Applied(report))
        }
        Err(LlmError::PatchParse(message)) => {
            warn!(call_site, "Fix response could not be parsed: {}", message);
            Ok(FixOutcome::Unparseable(message))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mock::{MockCompletionService, MockReply};
    use shipwright_core::{ErrorParser, GenerationConfig};

    fn gateway(mock: &MockCompletionService) -> GenerationGateway {
        let config = GenerationConfig {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        };
        GenerationGateway::new(Arc::new(mock.clone()), config)
    }

    fn failing_outcome() -> ParseOutcome {
        ErrorParser::new().parse("src/a.ts(2,1): error TS2304: Cannot find name 'y'.", "")
    }

    #[tokio::test]
    async fn test_fix_applied() {
        let files = FileSet::new().with_file("src/a.ts", "const x = 1;\ny;\n");
        let mock = MockCompletionService::new()
            .add_text("### FILE: src/a.ts\n```ts\nconst x = 1;\nexport {};\n```\n");
        let outcome = request_fix(&gateway(&mock), &files, &failing_outcome(), Phase::Build)
            .await
            .unwrap();
        let fixed = outcome.files_or(&files);
        assert_eq!(fixed.get("src/a.ts"), Some("const x = 1;\nexport {};\n"));
        assert!(mock.requests()[0].user.contains(">> 2 | y;"));
    }

    #[tokio::test]
    async fn test_unparseable_is_not_an_error() {
        let files = FileSet::new().with_file("src/a.ts", "y;\n");
        let mock = MockCompletionService::new().add_text("Looks fine to me!");
        let outcome = request_fix(&gateway(&mock), &files, &failing_outcome(), Phase::Deploy)
            .await
            .unwrap();
        assert!(matches!(outcome, FixOutcome::Unparseable(_)));
        assert_eq!(outcome.files_or(&files), files);
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let files = FileSet::new();
        let mock = MockCompletionService::new().add_reply(MockReply::status(400));
        let err = request_fix(&gateway(&mock), &files, &failing_outcome(), Phase::Build)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Client { .. }));
    }
}
