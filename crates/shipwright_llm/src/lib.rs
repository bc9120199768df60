//! # shipwright_llm
//!
//! Generation Gateway for Shipwright.
//!
//! - **Providers**: OpenAI chat-completions and Anthropic messages behind
//!   [`CompletionService`]
//! - **Gateway**: retry with exponential backoff and jitter, fatal client
//!   errors, fallback to a cheaper model tier on the final retries
//! - **Cost**: per-call usage records priced from a static table
//! - **Patches**: `### FILE:` / `### DIFF:` / `### DELETE:` response parsing
//! - **Prompts**: generation and fix prompts with `>>`-marked error lines

pub mod cost;
pub mod error;
pub mod fix;
pub mod gateway;
pub mod mock;
pub mod patch;
pub mod prompt;
pub mod provider;

pub use cost::{LlmModel, LlmPricing, UsageLedger, UsageRecord};
pub use error::{LlmError, LlmResult};
pub use fix::{request_fix, FixOutcome};
pub use gateway::GenerationGateway;
pub use mock::{MockCompletionService, MockReply};
pub use patch::Patch;
pub use prompt::{
    build_fix_prompt, build_generation_prompt, fix_system_prompt, generation_system_prompt,
    render_numbered,
};
pub use provider::{CompletionRequest, CompletionResponse, CompletionService, HttpCompletionService};
