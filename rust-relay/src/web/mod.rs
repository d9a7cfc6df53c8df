//! Web server module for the Samsara webhook relay.
//!
//! This module provides the HTTP boundary that:
//! - Admits requests only from whitelisted origins
//! - Verifies the Samsara HMAC signature over the raw body
//! - Filters events by type
//! - Forwards accepted events to Make.com and/or IFTTT and reports each outcome

pub mod handlers;
pub mod origin;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, process_request, relay_webhook, AppState, HealthResponse, RelayOutcome,
    RelayResponse, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use origin::{is_allowed, resolve_source_address, AllowList};
pub use signature::{compute_signature, verify_signature, SigningSecret};

/// Path Samsara posts webhooks to.
pub const WEBHOOK_PATH: &str = "/api/webhook-handler";

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(relay_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
