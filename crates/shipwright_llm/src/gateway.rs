//! Generation Gateway.
//!
//! Wraps a [`CompletionService`] with retry, exponential backoff with jitter,
//! and model-tier fallback. Overload, server and network errors are retried;
//! client errors are fatal. From the penultimate retry onward the request
//! switches to the configured fallback tier, if there is one.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use shipwright_core::{GenerationConfig, ModelTier};

use crate::cost::{UsageLedger, UsageRecord};
use crate::error::{LlmError, LlmResult};
use crate::provider::{CompletionRequest, CompletionService, HttpCompletionService};

/// Call site used by [`GenerationGateway::complete`].
pub const DEFAULT_CALL_SITE: &str = "generate";

/// Retrying, tier-aware front door to the generation service.
#[derive(Clone)]
pub struct GenerationGateway {
    service: Arc<dyn CompletionService>,
    config: GenerationConfig,
    ledger: UsageLedger,
}

impl GenerationGateway {
    pub fn new(service: Arc<dyn CompletionService>, config: GenerationConfig) -> Self {
        Self {
            service,
            config,
            ledger: UsageLedger::new(),
        }
    }

    /// Build a gateway over the HTTP provider named in the configuration.
    pub fn from_config(config: &GenerationConfig) -> LlmResult<Self> {
        let service = HttpCompletionService::from_config(config)?;
        Ok(Self::new(Arc::new(service), config.clone()))
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Complete a prompt at the given tier.
    pub async fn complete(&self, system: &str, user: &str, tier: ModelTier) -> LlmResult<String> {
        self.complete_for(DEFAULT_CALL_SITE, system, user, tier).await
    }

    /// Complete a prompt, tagging usage with a call site.
    pub async fn complete_for(
        &self,
        call_site: &str,
        system: &str,
        user: &str,
        tier: ModelTier,
    ) -> LlmResult<String> {
        let max_retries = self.config.max_retries;
        let mut last_error = None;

        for retry in 0..=max_retries {
            if retry > 0 {
                let delay = self.backoff_delay(retry);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let active_tier = self.tier_for_retry(tier, retry);
            let request = CompletionRequest {
                model: self.config.model_for(active_tier),
                system: system.to_string(),
                user: user.to_string(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            match self.service.complete(&request).await {
                Ok(response) => {
                    let record = UsageRecord::new(
                        &response.model,
                        active_tier,
                        response.input_tokens,
                        response.output_tokens,
                        call_site,
                    );
                    info!(
                        call_site,
                        model = %response.model,
                        tier = %active_tier,
                        input_tokens = response.input_tokens,
                        output_tokens = response.output_tokens,
                        cost = record.cost,
                        "Completion succeeded"
                    );
                    self.ledger.record(record);
                    return Ok(response.content);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        call_site,
                        attempt = retry + 1,
                        max_attempts = max_retries + 1,
                        model = %request.model,
                        "Retryable generation error: {}",
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    error!(call_site, model = %request.model, "Fatal generation error: {}", e);
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    /// Tier for a given retry number (0 is the initial call).
    pub fn tier_for_retry(&self, requested: ModelTier, retry: u32) -> ModelTier {
        let max_retries = self.config.max_retries;
        if retry >= 1 && retry + 1 >= max_retries {
            self.config.fallback_for(requested).unwrap_or(requested)
        } else {
            requested
        }
    }

    /// Exponential backoff capped at `max_backoff_ms`, plus up to 50% jitter.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let base = self.config.base_backoff_ms;
        let max = self.config.max_backoff_ms;
        if base == 0 || retry == 0 {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1).min(20);
        let delay = base.saturating_mul(1u64 << exponent).min(max);
        let jitter = rand::thread_rng().gen_range(0..=delay / 2);
        Duration::from_millis(delay.saturating_add(jitter).min(max))
    }
}
