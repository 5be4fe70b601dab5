#![forbid(unsafe_code)]
#![doc = r#"
Tollgate

Cost-aware routing gateway in front of local text-generation backends: it
classifies each prompt's complexity, routes it to a cheap or expensive model,
forwards the call with retry/backoff, and appends one JSON-lines accounting
record (tokens, latency, cost, routing reasons) per completed request.

Crate highlights
- Classification: deterministic heuristic scoring or a config-driven rule
  table, via `classify(&GatewayConfig, request_id, prompt)`.
- HTTP server (in `server` + `middleware`): `POST /generate` metered by the
  `CostAccounting` middleware; everything else passes through untouched.
- Resilience: `HttpGenerateClient` separates connect and read timeouts and
  retries transient network failures with bounded exponential backoff.

Modules
- `router`: Complexity scoring and model selection.
- `routing_config`: Gateway configuration and the routing-rule table.
- `pricing`: Token estimation and the per-million pricing table.
- `middleware`: Body capture/replay, response capture, accounting dispatch.
- `upstream`: Resilient client for the generate backend.
- `accounting`: Accounting records and the append-only JSONL sink.
- `server`: Actix route handlers and inbound validation.
- `util`: Shared helpers (tracing, env, state, CORS).

Note: responses are buffered, not streamed; the accounting path never alters
what the caller receives.
"#]

pub mod accounting;
pub mod middleware;
pub mod pricing;
pub mod router;
pub mod routing_config;
pub mod server;
pub mod upstream;
pub mod util;

// Re-export the primary types for ergonomic library use.
pub use crate::accounting::{AccountingLog, AccountingRecord};
pub use crate::middleware::CostAccounting;
pub use crate::pricing::{estimate_tokens, ModelPricing, PricingTable};
pub use crate::router::{classify, RoutingDecision};
pub use crate::routing_config::{GatewayConfig, RoutingRule};
pub use crate::upstream::{
    GenerateClient, GenerateOutput, GeneratePayload, HttpGenerateClient, UpstreamConfig,
    UpstreamError,
};
