//! HTTP surface: the generate endpoint, inbound validation, and status.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;
use crate::router::RoutingDecision;
use crate::upstream::{GenerateClient, GeneratePayload, UpstreamError};
use crate::util::{error_response, AppState};

/// Inbound prompts over this are rejected before any routing work.
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Inbound body for `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,

    /// Advisory; the routing decision wins when the middleware is mounted.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub response: String,
    pub model_used: String,
    pub total_duration_ms: f64,
    pub request_id: String,
}

/// Reject blank prompts and prompts over the inbound size cap.
pub fn validate_prompt(prompt: &str) -> Result<(), String> {
    if prompt.trim().is_empty() {
        return Err("Prompt cannot be empty".to_string());
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(format!(
            "Prompt is too long (max {MAX_PROMPT_CHARS} characters)"
        ));
    }
    Ok(())
}

async fn generate(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<GenerateRequest>,
) -> impl Responder {
    if let Err(msg) = validate_prompt(&body.prompt) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // The routing decision from the middleware overrides the requested
    // model; without it, honor the request or fall back to the default.
    let target_model = req
        .extensions()
        .get::<RoutingDecision>()
        .map(|d| d.selected_model.clone())
        .or_else(|| body.model.clone())
        .unwrap_or_else(|| state.config.fallback_model.clone());

    let payload = GeneratePayload {
        model: target_model.clone(),
        prompt: body.prompt.clone(),
        system: body.system_prompt.clone(),
        stream: false,
    };

    match state.upstream.generate(&payload).await {
        Ok(output) => {
            let model_used = if output.model.is_empty() {
                target_model
            } else {
                output.model
            };
            HttpResponse::Ok().json(GenerateResponse {
                response: output.response,
                model_used,
                total_duration_ms: output.total_duration as f64 / 1_000_000.0,
                request_id,
            })
        }
        Err(err) => {
            tracing::error!(request_id = %request_id, error = %err, "upstream call failed");
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
            let msg = match err {
                UpstreamError::Engine { .. } => "Model engine error.",
                _ => "Service unavailable after multiple attempts.",
            };
            error_response(status, msg)
        }
    }
}

async fn status() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "tollgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/generate", web::post().to(generate))
        .route("/status", web::get().to(status));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_prompts_are_rejected() {
        assert!(validate_prompt("").is_err());
        assert!(validate_prompt("   \t\n").is_err());
    }

    #[test]
    fn oversized_prompts_are_rejected() {
        assert!(validate_prompt(&"a".repeat(MAX_PROMPT_CHARS)).is_ok());
        assert!(validate_prompt(&"a".repeat(MAX_PROMPT_CHARS + 1)).is_err());
    }

    #[test]
    fn ordinary_prompts_pass() {
        assert!(validate_prompt("explain why the sky is blue").is_ok());
    }
}
