//! Complexity classification and model selection.
//!
//! Two deterministic policies over the prompt text: a heuristic score
//! (length + reasoning-intent keywords) used when no rule table is
//! configured, and the ordered rule table from [`GatewayConfig`]. Both are
//! pure functions: the same prompt always yields the same decision.

use serde::Serialize;

use crate::pricing::estimate_tokens;
use crate::routing_config::GatewayConfig;

/// Keywords that signal the caller wants reasoning or code, not retrieval.
const COMPLEX_KEYWORDS: &[&str] = &[
    "explain",
    "why",
    "code",
    "function",
    "analyze",
    "compare",
    "step-by-step",
];

/// Prompts shorter than this count as "short" for the length heuristic.
const SHORT_PROMPT_CHARS: usize = 200;

/// Heuristic scores must exceed this to select the large model.
const LARGE_MODEL_THRESHOLD: u32 = 5;

/// The routing outcome for one request. Created once at ingress, stored in
/// the request's extensions, immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub request_id: String,
    pub selected_model: String,
    pub complexity_score: u32,
    pub reasons: Vec<String>,
}

/// Classify a prompt and select a target model.
///
/// The rule-table policy is active when the config carries rules; otherwise
/// the built-in heuristic runs. Empty prompts classify like any other.
pub fn classify(config: &GatewayConfig, request_id: &str, prompt: &str) -> RoutingDecision {
    if config.rules.is_empty() {
        classify_heuristic(config, request_id, prompt)
    } else {
        classify_rules(config, request_id, prompt)
    }
}

fn classify_heuristic(config: &GatewayConfig, request_id: &str, prompt: &str) -> RoutingDecision {
    let mut score = 0u32;
    let mut reasons = Vec::new();

    // Short queries are usually factual or greetings.
    if prompt.chars().count() < SHORT_PROMPT_CHARS {
        score += 1;
        reasons.push("short_input".to_string());
    } else {
        score += 5;
        reasons.push("long_input".to_string());
    }

    let lowered = prompt.to_lowercase();
    if COMPLEX_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 10;
        reasons.push("complex_intent".to_string());
    }

    // Threshold is exclusive: ties resolve toward the small model.
    let selected_model = if score > LARGE_MODEL_THRESHOLD {
        config.large_model.clone()
    } else {
        config.small_model.clone()
    };

    RoutingDecision {
        request_id: request_id.to_string(),
        selected_model,
        complexity_score: score,
        reasons,
    }
}

fn classify_rules(config: &GatewayConfig, request_id: &str, prompt: &str) -> RoutingDecision {
    let lowered = prompt.to_lowercase();
    let input_tokens = estimate_tokens(prompt);

    let mut selected_model = config.fallback_model.clone();
    let mut score = 0u32;
    let mut reasons: Vec<String> = Vec::new();

    for rule in &config.rules {
        if rule.keywords.iter().any(|k| lowered.contains(k.as_str())) {
            selected_model = rule.target_model.clone();
            score = 10;
            reasons = vec!["keyword_match".to_string()];
            break;
        }
        if input_tokens > rule.max_tokens {
            // Length matches do not stop iteration: a later rule's threshold
            // may overwrite this selection.
            selected_model = rule.target_model.clone();
            score = 5;
            reasons = vec!["length_threshold".to_string()];
        }
    }

    RoutingDecision {
        request_id: request_id.to_string(),
        selected_model,
        complexity_score: score,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing_config::RoutingRule;

    fn heuristic_config() -> GatewayConfig {
        GatewayConfig::default()
    }

    fn rule_config(rules: Vec<RoutingRule>) -> GatewayConfig {
        GatewayConfig {
            rules,
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let config = heuristic_config();
        let a = classify(&config, "req-1", "explain monads");
        let b = classify(&config, "req-1", "explain monads");
        assert_eq!(a.selected_model, b.selected_model);
        assert_eq!(a.complexity_score, b.complexity_score);
        assert_eq!(a.reasons, b.reasons);
    }

    #[test]
    fn short_prompt_without_keywords_scores_one() {
        let config = heuristic_config();
        let prompt = "b".repeat(199);
        let decision = classify(&config, "req", &prompt);
        assert_eq!(decision.complexity_score, 1);
        assert_eq!(decision.selected_model, config.small_model);
        assert_eq!(decision.reasons, vec!["short_input"]);
    }

    #[test]
    fn long_prompt_without_keywords_stays_on_small_model() {
        let config = heuristic_config();
        // Score 5 does not exceed the threshold; boundary is exclusive.
        let prompt = "b".repeat(201);
        let decision = classify(&config, "req", &prompt);
        assert_eq!(decision.complexity_score, 5);
        assert_eq!(decision.selected_model, config.small_model);
        assert_eq!(decision.reasons, vec!["long_input"]);
    }

    #[test]
    fn long_prompt_with_keyword_selects_large_model() {
        let config = heuristic_config();
        let prompt = format!("why {}", "b".repeat(200));
        let decision = classify(&config, "req", &prompt);
        assert_eq!(decision.complexity_score, 15);
        assert_eq!(decision.selected_model, config.large_model);
    }

    #[test]
    fn short_reasoning_prompt_selects_large_model() {
        let config = heuristic_config();
        let decision = classify(&config, "req", "explain why the sky is blue");
        assert_eq!(decision.complexity_score, 11);
        assert_eq!(decision.selected_model, config.large_model);
        assert_eq!(decision.reasons, vec!["short_input", "complex_intent"]);
    }

    #[test]
    fn five_hundred_plain_chars_stay_on_small_model() {
        let config = heuristic_config();
        let decision = classify(&config, "req", &"a".repeat(500));
        assert_eq!(decision.complexity_score, 5);
        assert_eq!(decision.selected_model, config.small_model);
    }

    #[test]
    fn empty_prompt_still_classifies() {
        let config = heuristic_config();
        let decision = classify(&config, "req", "");
        assert_eq!(decision.complexity_score, 1);
        assert_eq!(decision.selected_model, config.small_model);
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let config = heuristic_config();
        let decision = classify(&config, "req", "EXPLAIN this");
        assert_eq!(decision.complexity_score, 11);
    }

    #[test]
    fn rule_keyword_match_wins_and_stops() {
        let config = rule_config(vec![
            RoutingRule {
                max_tokens: 9999,
                keywords: vec!["explain".to_string()],
                target_model: "llama3".to_string(),
            },
            RoutingRule {
                max_tokens: 0,
                keywords: vec!["explain".to_string()],
                target_model: "never-selected".to_string(),
            },
        ]);
        let decision = classify(&config, "req", "explain this");
        assert_eq!(decision.selected_model, "llama3");
        assert_eq!(decision.complexity_score, 10);
        assert_eq!(decision.reasons, vec!["keyword_match"]);
    }

    #[test]
    fn rule_length_match_is_overwritten_by_later_rule() {
        // Both thresholds trip; iteration continues past a length match, so
        // the later rule's target wins.
        let config = rule_config(vec![
            RoutingRule {
                max_tokens: 10,
                keywords: vec![],
                target_model: "first".to_string(),
            },
            RoutingRule {
                max_tokens: 20,
                keywords: vec![],
                target_model: "second".to_string(),
            },
        ]);
        let decision = classify(&config, "req", &"x".repeat(200));
        assert_eq!(decision.selected_model, "second");
        assert_eq!(decision.complexity_score, 5);
        assert_eq!(decision.reasons, vec!["length_threshold"]);
    }

    #[test]
    fn unmatched_rules_fall_back_with_zero_score() {
        let config = rule_config(vec![RoutingRule {
            max_tokens: 9999,
            keywords: vec!["explain".to_string()],
            target_model: "llama3".to_string(),
        }]);
        let decision = classify(&config, "req", "short greeting");
        assert_eq!(decision.selected_model, config.fallback_model);
        assert_eq!(decision.complexity_score, 0);
        assert!(decision.reasons.is_empty());
    }
}
