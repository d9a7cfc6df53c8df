//! Error types for the relay.
//!
//! - [`RelayError`]: terminal failures of the verification stages of one request
//! - [`SendError`]: a single destination's failed forward (never fatal to the batch)
//! - [`ConfigError`]: problems found while loading configuration at startup

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::dispatch::Destination;
use crate::web::RelayResponse;

/// A verification-stage failure. Each variant ends request handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    #[error("missing or invalid signature headers")]
    MissingCredentials,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl RelayError {
    /// HTTP status surfaced to the caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::OriginRejected(_) => StatusCode::FORBIDDEN,
            RelayError::MissingCredentials
            | RelayError::SignatureMismatch
            | RelayError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short reason safe to return to the caller.
    ///
    /// Never includes the offending address or parser internals.
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::OriginRejected(_) => "Forbidden: origin not whitelisted",
            RelayError::MissingCredentials => "Missing signature or timestamp",
            RelayError::SignatureMismatch => "Signature mismatch",
            RelayError::MalformedPayload(_) => "Invalid JSON body",
        }
    }

    fn status_label(&self) -> &'static str {
        match self {
            RelayError::OriginRejected(_) => "forbidden",
            _ => "bad_request",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(RelayResponse {
                status: self.status_label(),
                message: Some(self.reason().to_string()),
                event_type: None,
                outcomes: None,
            }),
        )
            .into_response()
    }
}

/// Why a forward to one destination failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("destination responded with status {0}")]
    UnexpectedStatus(u16),

    #[error("response body did not contain expected acknowledgement")]
    UnexpectedBody,

    #[error("payload could not be serialized: {0}")]
    Serialize(String),

    #[error("send task did not complete: {0}")]
    Aborted(String),
}

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid webhook choice '{0}', expected one of: make, ifttt, both")]
    InvalidChoice(String),

    #[error("{destination} destination is active but no URL is configured")]
    MissingDestinationUrl { destination: Destination },

    #[error("{destination} destination URL is invalid: {reason}")]
    InvalidDestinationUrl {
        destination: Destination,
        reason: String,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
