//! Resilient client for the generate backend.
//!
//! Connection establishment fails fast while generation is allowed to take
//! long: connect and total timeouts are configured separately. Transient
//! network failures (connect, read/pool timeout) are retried with bounded
//! exponential backoff; a semantic error status from the engine is terminal
//! and surfaced immediately.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Wire request for `POST {base}/api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratePayload {
    pub model: String,
    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    pub stream: bool,
}

/// Wire response from the generate backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateOutput {
    #[serde(default)]
    pub response: String,

    #[serde(default)]
    pub model: String,

    /// Generation wall-clock time reported by the backend, in nanoseconds.
    #[serde(default)]
    pub total_duration: u64,
}

/// Failure classes for upstream calls.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The engine answered with a semantic error status. Never retried.
    #[error("engine error: upstream returned status {status}")]
    Engine { status: u16 },

    /// Every attempt failed with a transient network error.
    #[error("upstream unavailable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// A transport failure outside the retryable classes.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl UpstreamError {
    /// HTTP status this failure maps to on the inbound surface.
    pub fn status_code(&self) -> u16 {
        match self {
            UpstreamError::Engine { status } => *status,
            UpstreamError::Exhausted { .. } | UpstreamError::Transport(_) => 503,
        }
    }
}

/// Timeout and retry policy for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the generate backend.
    pub base_url: String,

    /// Connection-establishment failures must surface quickly.
    pub connect_timeout: Duration,

    /// Token generation may legitimately take long.
    pub request_timeout: Duration,

    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(90),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
        }
    }
}

impl UpstreamConfig {
    /// Build the policy from environment variables, falling back to
    /// defaults field by field.
    ///
    /// `OLLAMA_HOST`, `TOLLGATE_MAX_RETRIES`,
    /// `TOLLGATE_CONNECT_TIMEOUT_SECONDS`, `TOLLGATE_REQUEST_TIMEOUT_SECONDS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            let host = host.trim();
            if !host.is_empty() {
                config.base_url = host.to_string();
            }
        }
        if let Some(n) = parse_env::<u32>("TOLLGATE_MAX_RETRIES") {
            config.max_attempts = n;
        }
        if let Some(secs) = parse_env::<u64>("TOLLGATE_CONNECT_TIMEOUT_SECONDS") {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("TOLLGATE_REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// The generic generate contract the gateway forwards through.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    async fn generate(&self, payload: &GeneratePayload) -> Result<GenerateOutput, UpstreamError>;
}

/// HTTP implementation of [`GenerateClient`] with retry/backoff.
pub struct HttpGenerateClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpGenerateClient {
    pub fn new(config: UpstreamConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("tollgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config }
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    /// Connect failures and read/pool timeouts are worth another attempt;
    /// everything else is terminal.
    fn is_retryable(err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout()
    }

    /// Delay before attempt `completed + 1`: base doubled per completed
    /// attempt beyond the first, capped.
    fn backoff_delay(&self, completed: u32) -> Duration {
        let exp = completed.saturating_sub(1).min(16);
        let delay = self.config.backoff_base.saturating_mul(1u32 << exp);
        delay.min(self.config.backoff_cap)
    }
}

#[async_trait]
impl GenerateClient for HttpGenerateClient {
    async fn generate(&self, payload: &GeneratePayload) -> Result<GenerateOutput, UpstreamError> {
        let url = self.endpoint();
        let attempts = self.config.max_attempts.max(1);
        let mut last_error: Option<reqwest::Error> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff_delay(attempt - 1)).await;
            }

            match self.http.post(&url).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(UpstreamError::Engine {
                            status: status.as_u16(),
                        });
                    }
                    return resp
                        .json::<GenerateOutput>()
                        .await
                        .map_err(UpstreamError::Transport);
                }
                Err(e) if Self::is_retryable(&e) => {
                    tracing::warn!(attempt, error = %e, "transient upstream failure");
                    last_error = Some(e);
                }
                Err(e) => return Err(UpstreamError::Transport(e)),
            }
        }

        Err(UpstreamError::Exhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt recorded".to_string()),
        })
    }
}
