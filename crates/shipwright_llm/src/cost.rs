//! Token usage and cost tracking.
//!
//! Pricing is an estimate for observability only; nothing in the pipeline
//! branches on cost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use shipwright_core::{ModelTier, UsageTotals};

/// Known model families with a price entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmModel {
    /// OpenAI GPT-4o
    Gpt4o,
    /// OpenAI GPT-4o Mini
    Gpt4oMini,
    /// OpenAI GPT-4.1
    Gpt41,
    /// OpenAI GPT-4.1 Mini
    Gpt41Mini,
    /// OpenAI GPT-4.1 Nano
    Gpt41Nano,
    /// Anthropic Claude Opus 4.x
    ClaudeOpus4,
    /// Anthropic Claude Sonnet 4.x
    ClaudeSonnet4,
    /// Anthropic Claude Haiku 3.5
    ClaudeHaiku35,
    /// Unknown model - use conservative fallback
    Unknown(String),
}

impl Default for LlmModel {
    fn default() -> Self {
        LlmModel::Unknown("unknown".to_string())
    }
}

impl LlmModel {
    /// Parse a provider model name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        let lower = s.to_lowercase();
        if lower.contains("gpt-4o-mini") {
            LlmModel::Gpt4oMini
        } else if lower.contains("gpt-4o") {
            LlmModel::Gpt4o
        } else if lower.contains("gpt-4.1-nano") {
            LlmModel::Gpt41Nano
        } else if lower.contains("gpt-4.1-mini") {
            LlmModel::Gpt41Mini
        } else if lower.contains("gpt-4.1") {
            LlmModel::Gpt41
        } else if lower.contains("opus-4") {
            LlmModel::ClaudeOpus4
        } else if lower.contains("sonnet-4") {
            LlmModel::ClaudeSonnet4
        } else if lower.contains("haiku") {
            LlmModel::ClaudeHaiku35
        } else {
            LlmModel::Unknown(s.to_string())
        }
    }
}

/// Price per 1k tokens in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl LlmPricing {
    /// Get pricing for a specific model
    pub fn for_model(model: &LlmModel) -> Self {
        let (input_per_1k, output_per_1k) = match model {
            LlmModel::Gpt4o => (0.0025, 0.01),
            LlmModel::Gpt4oMini => (0.00015, 0.0006),
            LlmModel::Gpt41 => (0.002, 0.008),
            LlmModel::Gpt41Mini => (0.0004, 0.0016),
            LlmModel::Gpt41Nano => (0.0001, 0.0004),
            LlmModel::ClaudeOpus4 => (0.015, 0.075),
            LlmModel::ClaudeSonnet4 => (0.003, 0.015),
            LlmModel::ClaudeHaiku35 => (0.0008, 0.004),
            LlmModel::Unknown(_) => (0.01, 0.03),
        };
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Calculate cost for given token counts
    pub fn calculate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / 1000.0) * self.input_per_1k;
        let output_cost = (output_tokens as f64 / 1000.0) * self.output_per_1k;
        input_cost + output_cost
    }
}

/// Record of a single completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: String,
    /// Provider model name as sent
    pub model: String,
    pub tier: ModelTier,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    /// Logical caller, e.g. `generate`, `build_fix`, `deploy_fix`
    pub call_site: String,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        model: &str,
        tier: ModelTier,
        input_tokens: u64,
        output_tokens: u64,
        call_site: &str,
    ) -> Self {
        let pricing = LlmPricing::for_model(&LlmModel::from_str(model));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.to_string(),
            tier,
            input_tokens,
            output_tokens,
            cost: pricing.calculate(input_tokens, output_tokens),
            call_site: call_site.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Running list of usage records, shared across clones.
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    records: Arc<RwLock<Vec<UsageRecord>>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: UsageRecord) {
        self.records.write().push(record);
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.read().clone()
    }

    /// Number of records so far; use as a mark for [`Self::totals_since`].
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn totals(&self) -> UsageTotals {
        self.totals_since(0)
    }

    /// Totals of records added after `mark`.
    pub fn totals_since(&self, mark: usize) -> UsageTotals {
        let records = self.records.read();
        records
            .iter()
            .skip(mark)
            .fold(UsageTotals::default(), |mut totals, r| {
                totals.calls += 1;
                totals.input_tokens += r.input_tokens;
                totals.output_tokens += r.output_tokens;
                totals.cost_usd += r.cost;
                totals
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_pricing_calculation() {
        let pricing = LlmPricing::for_model(&LlmModel::Gpt41Mini);
        // 1000 input + 500 output @ $0.0004/$0.0016 per 1k tokens
        let cost = pricing.calculate(1000, 500);
        assert!((cost - 0.0012).abs() < 0.00001);
    }

    #[test]
    fn test_llm_model_parsing() {
        assert_eq!(LlmModel::from_str("gpt-4o-mini-2024-07-18"), LlmModel::Gpt4oMini);
        assert_eq!(LlmModel::from_str("GPT-4o"), LlmModel::Gpt4o);
        assert_eq!(LlmModel::from_str("claude-sonnet-4-20250514"), LlmModel::ClaudeSonnet4);
        assert_eq!(LlmModel::from_str("claude-3-5-haiku-20241022"), LlmModel::ClaudeHaiku35);
        assert!(matches!(LlmModel::from_str("mystery"), LlmModel::Unknown(_)));
    }

    #[test]
    fn test_ledger_totals() {
        let ledger = UsageLedger::new();
        ledger.record(UsageRecord::new("gpt-4o", ModelTier::Primary, 1000, 1000, "generate"));
        let mark = ledger.len();
        ledger.record(UsageRecord::new("gpt-4o-mini", ModelTier::Fast, 2000, 0, "build_fix"));

        let all = ledger.totals();
        assert_eq!(all.calls, 2);
        assert_eq!(all.input_tokens, 3000);
        assert!((all.cost_usd - (0.0125 + 0.0003)).abs() < 1e-9);

        let since = ledger.totals_since(mark);
        assert_eq!(since.calls, 1);
        assert_eq!(since.output_tokens, 0);
    }
}
