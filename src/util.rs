//! Shared runtime plumbing: environment/tracing init, application state,
//! CORS construction, and the JSON error body helper.

use actix_web::HttpResponse;
use http::StatusCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::accounting::AccountingLog;
use crate::routing_config::GatewayConfig;
use crate::upstream::{GenerateClient, HttpGenerateClient, UpstreamConfig};

/// Initialize dotenv and structured tracing based on RUST_LOG.
///
/// An explicit env file (ENV_FILE) wins over standard `.env` discovery;
/// existing process env is never overwritten.
pub fn init_tracing() {
    let mut env_source: String = "none".into();

    if let Ok(p) = std::env::var("ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() && std::path::Path::new(p).is_file() && dotenvy::from_filename(p).is_ok() {
            env_source = format!("{p} (ENV_FILE)");
        }
    }
    if env_source == "none" && dotenvy::dotenv().is_ok() {
        env_source = ".env".into();
    }

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("Environment loaded from: {}", env_source);
}

/// Get the bind address for the HTTP server from env or default to 0.0.0.0:8088.
pub fn env_bind_addr() -> String {
    std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".into())
}

/// Shared application state used by the HTTP server and handlers.
pub struct AppState {
    /// Immutable gateway configuration; concurrent reads, no locks.
    pub config: Arc<GatewayConfig>,
    /// Client for the generate backend.
    pub upstream: Arc<dyn GenerateClient>,
    /// Accounting sink shared with the middleware.
    pub accounting: Arc<AccountingLog>,
}

impl AppState {
    /// Assemble state around a resolved config; the upstream client policy
    /// comes from the environment.
    pub fn new(config: GatewayConfig) -> Self {
        let accounting = Arc::new(AccountingLog::new(&config.log_path));
        Self {
            config: Arc::new(config),
            upstream: Arc::new(HttpGenerateClient::new(UpstreamConfig::from_env())),
            accounting,
        }
    }

    /// State with an explicit upstream client (used by tests).
    pub fn with_upstream(config: GatewayConfig, upstream: Arc<dyn GenerateClient>) -> Self {
        let accounting = Arc::new(AccountingLog::new(&config.log_path));
        Self {
            config: Arc::new(config),
            upstream,
            accounting,
        }
    }

    /// Resolve config from env and assemble state.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(GatewayConfig::resolve(None)?))
    }
}

/// Build a JSON error response with the given HTTP status and message.
pub fn error_response(status: StatusCode, msg: &str) -> HttpResponse {
    let body = serde_json::json!({ "error": { "message": msg } });
    HttpResponse::build(actix_web::http::StatusCode::from_u16(status.as_u16()).unwrap()).json(body)
}

/// Build a CORS configuration from CORS_ALLOWED_ORIGINS ("*" or a
/// comma-separated list; default any origin). Methods and headers stay
/// permissive.
pub fn cors_config_from_env() -> actix_cors::Cors {
    let mut cors = actix_cors::Cors::default()
        .allow_any_method()
        .allow_any_header();

    match std::env::var("CORS_ALLOWED_ORIGINS") {
        Ok(origins) if origins.trim() != "*" => {
            for part in origins.split(',') {
                let p = part.trim();
                if !p.is_empty() {
                    cors = cors.allowed_origin(p);
                }
            }
        }
        _ => {
            cors = cors.allow_any_origin();
        }
    }

    cors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_carries_status_and_message() {
        let resp = error_response(StatusCode::BAD_REQUEST, "Prompt cannot be empty");
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[test]
    fn state_shares_config_log_path_with_accounting() {
        let config = GatewayConfig::default();
        let expected = config.log_path.clone();
        let state = AppState::new(config);
        assert_eq!(state.accounting.path(), expected.as_path());
    }
}
