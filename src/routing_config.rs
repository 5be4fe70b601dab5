//! Gateway configuration.
//!
//! Model targets, the ordered routing-rule table, pricing, and the
//! accounting log path. Constructed once at startup (defaults, JSON file,
//! env overrides) and shared read-only across requests, no locking.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pricing::PricingTable;

/// One entry of the config-driven routing table, evaluated in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Prompts whose estimated token count exceeds this select the target.
    pub max_tokens: u64,

    /// Keywords that select the target outright (first match wins).
    #[serde(default)]
    pub keywords: Vec<String>,

    pub target_model: String,
}

/// Main gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Target for low-complexity prompts under the heuristic policy.
    #[serde(default = "default_small_model")]
    pub small_model: String,

    /// Target for high-complexity prompts under the heuristic policy.
    #[serde(default = "default_large_model")]
    pub large_model: String,

    /// Used when no routing rule matches.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Ordered rule table; empty means the heuristic policy is active.
    #[serde(default)]
    pub rules: Vec<RoutingRule>,

    #[serde(default)]
    pub pricing: PricingTable,

    /// Accounting sink, one JSON line per completed request.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

fn default_small_model() -> String {
    "qwen3:4b".to_string()
}

fn default_large_model() -> String {
    "deepseek-r1:8b".to_string()
}

fn default_fallback_model() -> String {
    "llama3".to_string()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("request_logs.jsonl")
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            small_model: default_small_model(),
            large_model: default_large_model(),
            fallback_model: default_fallback_model(),
            rules: Vec::new(),
            pricing: PricingTable::default(),
            log_path: default_log_path(),
        }
    }
}

impl GatewayConfig {
    /// Load gateway config from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading gateway config {}", path.display()))?;
        let config: GatewayConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing gateway config {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the effective config: an explicit path wins, then
    /// `TOLLGATE_CONFIG`, then built-in defaults. `LOG_FILE` overrides the
    /// log path either way.
    pub fn resolve(explicit_path: Option<&str>) -> Result<Self> {
        let path = explicit_path
            .map(str::to_string)
            .or_else(|| std::env::var("TOLLGATE_CONFIG").ok())
            .filter(|p| !p.trim().is_empty());

        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };

        if let Ok(log_path) = std::env::var("LOG_FILE") {
            if !log_path.trim().is_empty() {
                config.log_path = PathBuf::from(log_path);
            }
        }

        Ok(config)
    }
}
