//! Webhook endpoint handlers.
//!
//! Each request walks the same path and stops at the first failing stage:
//!
//! ```text
//! Received → OriginChecked → SignatureChecked → Parsed → Classified → Dispatched → Responded
//! ```
//!
//! The handler answers only after every destination send has settled.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::classify::{Classification, EventClassifier};
use crate::dispatch::{DestinationConfig, DispatchResult, DispatchSummary, Dispatcher};
use crate::error::{ConfigError, RelayError};
use crate::web::origin::{is_allowed, resolve_source_address, AllowList};
use crate::web::signature::{is_well_formed_signature, verify_signature, SigningSecret};
use crate::Config;

/// Header carrying the sender's timestamp.
pub const TIMESTAMP_HEADER: &str = "x-samsara-timestamp";

/// Header carrying the `v1=<hex>` signature.
pub const SIGNATURE_HEADER: &str = "x-samsara-signature";

/// Shared application state. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub secret: Option<Arc<SigningSecret>>,
    pub allow_list: Arc<AllowList>,
    pub trust_forwarded_for: bool,
    pub classifier: Arc<EventClassifier>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(
        secret: Option<SigningSecret>,
        allow_list: AllowList,
        trust_forwarded_for: bool,
        classifier: EventClassifier,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            secret: secret.map(Arc::new),
            allow_list: Arc::new(allow_list),
            trust_forwarded_for,
            classifier: Arc::new(classifier),
            dispatcher,
        }
    }

    /// Assemble the state from configuration, loading the whitelist and
    /// destination choice files.
    ///
    /// A missing or undecodable secret is not an error here: it is logged and
    /// every request is then rejected at signature verification.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let secret = match config.secret_key.as_deref() {
            None => {
                warn!("signing_secret_missing");
                None
            }
            Some(encoded) => match SigningSecret::from_base64(encoded) {
                Ok(secret) => Some(secret),
                Err(e) => {
                    error!(error = %e, "signing_secret_undecodable");
                    None
                }
            },
        };

        let allow_list = match AllowList::load(&config.whitelist_path) {
            Ok(list) => list,
            Err(ConfigError::Io { path, source }) if config.origin_allowlist.is_some() => {
                warn!(path = %path.display(), error = %source, "origin_whitelist_file_unavailable");
                AllowList::default()
            }
            Err(e) => return Err(e),
        };
        let allow_list =
            allow_list.with_addresses(config.origin_allowlist.clone().unwrap_or_default());

        if allow_list.is_empty() {
            warn!("origin_allowlist_empty");
        }

        let classifier = EventClassifier::new(config.allowed_event_types.clone());

        let choice = config.resolve_destination_choice()?;
        let destinations = DestinationConfig::new(choice, &config.destination_endpoints())?;
        let dispatcher = Dispatcher::new(destinations, config.forward_timeout())?;

        info!(
            webhook_choice = choice.as_str(),
            allowlist_entries = allow_list.len(),
            trust_forwarded_for = config.trust_forwarded_for,
            event_types = ?classifier.allowed(),
            "relay_state_ready"
        );

        Ok(Self::new(
            secret,
            allow_list,
            config.trust_forwarded_for,
            classifier,
            dispatcher,
        ))
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Samsara Webhook
// =============================================================================

/// Body of every relay response.
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<DispatchResult>,
}

/// Result of a request that passed verification.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Event type not relayed; nothing was sent.
    Skipped { event_type: String },
    /// Event forwarded; one outcome per active destination.
    Dispatched {
        event_type: String,
        result: DispatchResult,
    },
}

impl IntoResponse for RelayOutcome {
    fn into_response(self) -> Response {
        match self {
            RelayOutcome::Skipped { event_type } => (
                StatusCode::OK,
                Json(RelayResponse {
                    status: "skipped",
                    message: Some("Event skipped".to_string()),
                    event_type: Some(event_type).filter(|t| !t.is_empty()),
                    outcomes: None,
                }),
            )
                .into_response(),
            RelayOutcome::Dispatched { event_type, result } => {
                // Total failure is reported in the body, not the status code.
                let summary = result.summary();
                let message = match summary {
                    DispatchSummary::Failed => "Failed to forward to any destination",
                    DispatchSummary::Partial => "Event processed with partial failures",
                    DispatchSummary::Delivered => "Event processed",
                };

                (
                    StatusCode::OK,
                    Json(RelayResponse {
                        status: summary.as_str(),
                        message: Some(message.to_string()),
                        event_type: Some(event_type),
                        outcomes: Some(result),
                    }),
                )
                    .into_response()
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Run the verification-and-dispatch pipeline for one request.
///
/// `body` must be the untouched wire bytes; the signature covers them exactly.
pub async fn process_request(
    state: &AppState,
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<RelayOutcome, RelayError> {
    let source = resolve_source_address(headers, peer, state.trust_forwarded_for);
    let source = match source {
        Some(address) if is_allowed(&address, &state.allow_list) => address,
        other => {
            let address = other.unwrap_or_else(|| "unknown".to_string());
            warn!(source = %address, "origin_rejected");
            return Err(RelayError::OriginRejected(address));
        }
    };

    info!(source = %source, body_length = body.len(), "relay_webhook_received");

    let (timestamp, signature) = match (
        header_str(headers, TIMESTAMP_HEADER),
        header_str(headers, SIGNATURE_HEADER),
    ) {
        (Some(timestamp), Some(signature)) if is_well_formed_signature(signature) => {
            (timestamp, signature)
        }
        (timestamp, signature) => {
            warn!(
                source = %source,
                has_timestamp = timestamp.is_some(),
                has_signature = signature.is_some(),
                "signature_headers_invalid"
            );
            return Err(RelayError::MissingCredentials);
        }
    };

    if !verify_signature(state.secret.as_deref(), timestamp, body, signature) {
        warn!(source = %source, timestamp = %timestamp, "signature_rejected");
        return Err(RelayError::SignatureMismatch);
    }

    let event: Value = serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "payload_invalid_json");
        RelayError::MalformedPayload(e.to_string())
    })?;

    if !event.is_object() {
        warn!("payload_not_object");
        return Err(RelayError::MalformedPayload(
            "expected a JSON object".to_string(),
        ));
    }

    let event_type = match state.classifier.classify_event(&event) {
        Classification::Accepted(event_type) => event_type,
        Classification::Skipped(event_type) => {
            info!(event_type = %event_type, "event_skipped");
            return Ok(RelayOutcome::Skipped { event_type });
        }
    };

    info!(event_type = %event_type, "event_accepted");

    let result = state.dispatcher.dispatch(&event).await;

    Ok(RelayOutcome::Dispatched { event_type, result })
}

/// Samsara webhook endpoint.
///
/// The peer address comes from `ConnectInfo` when the server is run with
/// `into_make_service_with_connect_info`; without it only a trusted
/// forwarded-for header can identify the origin.
pub async fn relay_webhook(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);

    match process_request(&state, peer, &headers, &body).await {
        Ok(outcome) => outcome.into_response(),
        Err(e) => e.into_response(),
    }
}
