//! Cost-accounting middleware.
//!
//! The composable request stage in front of the generate handler. It buffers
//! the inbound body so the prompt can be classified and then replays the
//! bytes for the route handler, stamps the routing decision into the
//! request's extensions, captures the outbound body for token accounting,
//! and hands one record per completed request to the append-only log
//! without making the caller wait for the write.
//!
//! Requests outside `POST /generate` pass through untouched.

use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use actix_web::body::{self, EitherBody, MessageBody};
use actix_web::dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::Method;
use actix_web::{Error, HttpMessage, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::StatusCode;

use crate::accounting::{AccountingLog, AccountingRecord};
use crate::pricing::estimate_tokens;
use crate::router::classify;
use crate::routing_config::GatewayConfig;
use crate::server::validate_prompt;
use crate::util::error_response;

/// Per-request id, stored in request extensions at ingress.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// What the inbound body turned out to be.
enum InboundBody {
    /// Parsed JSON; a missing prompt field reads as empty.
    Json { prompt: String },
    /// Not JSON. Classified as an empty prompt; the route handler still
    /// rejects the body on its own terms.
    Malformed,
}

fn parse_inbound(body: &[u8]) -> InboundBody {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => InboundBody::Json {
            prompt: value
                .get("prompt")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        Err(_) => InboundBody::Malformed,
    }
}

/// Pull the generated text out of a captured response body, if any.
fn response_text(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("response")
                .and_then(|r| r.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_default()
}

/// Drain the request payload into one buffer. A read failure keeps whatever
/// arrived: capture degrades, it never aborts the request.
async fn buffer_body(req: &mut ServiceRequest) -> Bytes {
    let mut payload = req.take_payload();
    let mut buf = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        match chunk {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(e) => {
                tracing::warn!(error = %e, "request body read failed during capture");
                break;
            }
        }
    }
    buf.freeze()
}

/// Hand the buffered bytes back to the request so the route handler sees
/// the original, unconsumed body.
fn replay_body(req: &mut ServiceRequest, bytes: Bytes) {
    let stream = futures_util::stream::once(async move {
        Ok::<Bytes, actix_web::error::PayloadError>(bytes)
    });
    req.set_payload(dev::Payload::Stream {
        payload: Box::pin(stream),
    });
}

/// Split a response into its head and fully buffered body bytes.
async fn split_and_capture<B: MessageBody>(res: HttpResponse<B>) -> (HttpResponse<()>, Bytes) {
    let mut slot = None;
    let head = res.map_body(|_, b| {
        slot = Some(b);
    });
    let captured = match slot {
        Some(b) => body::to_bytes(b).await.unwrap_or_else(|_| Bytes::new()),
        None => Bytes::new(),
    };
    (head, captured)
}

/// Middleware factory holding the shared config and accounting sink.
pub struct CostAccounting {
    config: Arc<GatewayConfig>,
    accounting: Arc<AccountingLog>,
}

impl CostAccounting {
    pub fn new(config: Arc<GatewayConfig>, accounting: Arc<AccountingLog>) -> Self {
        Self { config, accounting }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CostAccounting
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CostAccountingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CostAccountingMiddleware {
            service: Rc::new(service),
            config: Arc::clone(&self.config),
            accounting: Arc::clone(&self.accounting),
        }))
    }
}

pub struct CostAccountingMiddleware<S> {
    service: Rc<S>,
    config: Arc<GatewayConfig>,
    accounting: Arc<AccountingLog>,
}

impl<S, B> Service<ServiceRequest> for CostAccountingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let config = Arc::clone(&self.config);
        let accounting = Arc::clone(&self.accounting);

        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            req.extensions_mut().insert(RequestId(request_id.clone()));

            // Only the generate surface is classified and metered.
            if req.method() != Method::POST || req.path() != "/generate" {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let body_bytes = buffer_body(&mut req).await;

            // A well-formed body with an invalid prompt is rejected before
            // classification: no upstream call, no accounting record.
            let prompt = match parse_inbound(&body_bytes) {
                InboundBody::Json { prompt } => {
                    if let Err(msg) = validate_prompt(&prompt) {
                        let res = error_response(StatusCode::BAD_REQUEST, &msg);
                        return Ok(req.into_response(res).map_into_right_body());
                    }
                    prompt
                }
                InboundBody::Malformed => String::new(),
            };

            let decision = classify(&config, &request_id, &prompt);
            tracing::debug!(
                request_id = %request_id,
                model = %decision.selected_model,
                score = decision.complexity_score,
                "routing decision"
            );
            req.extensions_mut().insert(decision.clone());

            replay_body(&mut req, body_bytes);

            // A handler-side rejection (e.g. the extractor refusing a
            // malformed body) is rendered here so it is accounted like any
            // other outcome.
            let http_req = req.request().clone();
            let start = Instant::now();
            let (http_req, head_res, captured) = match service.call(req).await {
                Ok(res) => {
                    let (http_req, http_res) = res.into_parts();
                    let (head, bytes) = split_and_capture(http_res).await;
                    (http_req, head, bytes)
                }
                Err(err) => {
                    let (head, bytes) = split_and_capture(err.error_response()).await;
                    (http_req, head, bytes)
                }
            };
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            let status = head_res.status();

            let output_text = response_text(&captured);
            let input_tokens = estimate_tokens(&prompt);
            let output_tokens = estimate_tokens(&output_text);
            let cost_usd =
                config
                    .pricing
                    .cost(&decision.selected_model, input_tokens, output_tokens);

            accounting.dispatch(AccountingRecord {
                request_id,
                timestamp: None,
                model: decision.selected_model,
                prompt_length: prompt.chars().count(),
                complexity_score: decision.complexity_score,
                reasons: decision.reasons,
                input_tokens,
                output_tokens,
                latency_ms,
                cost_usd,
                http_status: status.as_u16(),
            });

            let rebuilt = head_res.set_body(captured);
            Ok(ServiceResponse::new(http_req, rebuilt)
                .map_into_boxed_body()
                .map_into_right_body())
        })
    }
}
