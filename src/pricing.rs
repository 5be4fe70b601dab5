//! Pricing and token estimation.
//!
//! Per-million-token prices keyed by model id with a default fallback, and
//! the character-count token heuristic that feeds cost estimation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Approximate token count for a piece of text (~4 characters per token).
///
/// Placeholder for a real tokenizer; accuracy only matters for cost
/// estimation, not billing.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

/// Per-million-token price for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

fn default_pricing_entry() -> ModelPricing {
    ModelPricing {
        input_cost_per_million: 0.50,
        output_cost_per_million: 1.50,
    }
}

/// Model id -> price mapping with a default entry for unknown models.
///
/// Built once at startup and shared read-only across requests; lookups
/// never fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    #[serde(default)]
    pub models: HashMap<String, ModelPricing>,

    /// Applied when a model has no entry of its own.
    #[serde(default = "default_pricing_entry")]
    pub default: ModelPricing,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "qwen3:4b".to_string(),
            ModelPricing {
                input_cost_per_million: 0.10,
                output_cost_per_million: 0.10,
            },
        );
        models.insert(
            "deepseek-r1:8b".to_string(),
            ModelPricing {
                input_cost_per_million: 0.50,
                output_cost_per_million: 1.50,
            },
        );
        Self {
            models,
            default: default_pricing_entry(),
        }
    }
}

impl PricingTable {
    /// Exact, case-sensitive lookup; unknown models get the default entry.
    pub fn price_for(&self, model: &str) -> &ModelPricing {
        self.models.get(model).unwrap_or(&self.default)
    }

    /// Estimated cost in USD, rounded to 8 decimal places.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let price = self.price_for(model);
        let input_cost = (input_tokens as f64 / 1_000_000.0) * price.input_cost_per_million;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * price.output_cost_per_million;
        round8(input_cost + output_cost)
    }
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_tokens_floors_char_count() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefg"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(200)), 50);
    }

    #[test]
    fn known_model_uses_its_own_entry() {
        let table = PricingTable::default();
        let price = table.price_for("qwen3:4b");
        assert_eq!(price.input_cost_per_million, 0.10);
        assert_eq!(price.output_cost_per_million, 0.10);
    }

    #[test]
    fn unknown_models_share_the_default_entry() {
        let table = PricingTable::default();
        let a = table.cost("unknown-model-xyz", 1_000_000, 0);
        let b = table.cost("another-unknown", 1_000_000, 0);
        assert_eq!(a, b);
        assert_eq!(a, table.default.input_cost_per_million);
    }

    #[test]
    fn cost_is_monotonic_in_both_token_counts() {
        let table = PricingTable::default();
        let base = table.cost("deepseek-r1:8b", 1_000, 1_000);
        assert!(table.cost("deepseek-r1:8b", 2_000, 1_000) >= base);
        assert!(table.cost("deepseek-r1:8b", 1_000, 2_000) >= base);
    }

    #[test]
    fn cost_is_rounded_to_eight_decimals() {
        let table = PricingTable::default();
        // 3 input tokens at 0.10/M = 0.0000003 exactly.
        assert_eq!(table.cost("qwen3:4b", 3, 0), 0.0000003);
        assert_eq!(table.cost("qwen3:4b", 0, 0), 0.0);
    }

    #[test]
    fn cost_is_deterministic() {
        let table = PricingTable::default();
        assert_eq!(
            table.cost("deepseek-r1:8b", 123, 456),
            table.cost("deepseek-r1:8b", 123, 456)
        );
    }
}
