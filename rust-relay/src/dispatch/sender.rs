//! Forwarding a single event to a single destination.

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, Response};
use tracing;

use super::{DestinationTarget, DispatchOutcome};
use crate::error::SendError;

/// Longest response body kept in an outcome, in characters.
pub const MAX_CAPTURED_BODY: usize = 1024;

/// Bytes read off the wire before giving up on the rest of a body.
/// Enough for `MAX_CAPTURED_BODY` characters of UTF-8.
const MAX_CAPTURED_BYTES: usize = MAX_CAPTURED_BODY * 4;

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_CAPTURED_BODY).collect()
}

/// Read at most `MAX_CAPTURED_BYTES` of the response body.
///
/// The remainder is never buffered; the connection is dropped instead.
async fn read_captured_body(resp: &mut Response) -> Result<String, reqwest::Error> {
    let mut captured = Vec::new();

    while captured.len() < MAX_CAPTURED_BYTES {
        match resp.chunk().await? {
            Some(chunk) => {
                let room = MAX_CAPTURED_BYTES - captured.len();
                captured.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            None => break,
        }
    }

    Ok(truncate_body(&String::from_utf8_lossy(&captured)))
}

fn classify_transport_error(e: &reqwest::Error, timeout: Duration) -> SendError {
    if e.is_timeout() {
        SendError::Timeout(timeout)
    } else {
        SendError::Transport(e.to_string())
    }
}

/// POST a JSON payload to one destination and record what happened.
///
/// Never returns an error: every failure becomes a failed outcome.
pub async fn send_to_destination(
    client: &Client,
    target: &DestinationTarget,
    body: Vec<u8>,
    timeout: Duration,
) -> DispatchOutcome {
    let destination = target.destination;

    tracing::info!(
        destination = destination.name(),
        host = target.url.host_str().unwrap_or(""),
        body_length = body.len(),
        timeout_seconds = timeout.as_secs_f64(),
        "forward_starting"
    );

    let request = client
        .post(target.url.clone())
        .timeout(timeout)
        .header(CONTENT_TYPE, "application/json")
        .body(body);

    let mut resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            let err = classify_transport_error(&e, timeout);
            tracing::error!(
                destination = destination.name(),
                error = %e,
                is_timeout = e.is_timeout(),
                "forward_request_error"
            );
            return DispatchOutcome::failed(destination, None, None, &err);
        }
    };

    let status = resp.status().as_u16();

    let text = match read_captured_body(&mut resp).await {
        Ok(text) => text,
        Err(e) => {
            let err = classify_transport_error(&e, timeout);
            tracing::error!(
                destination = destination.name(),
                status_code = status,
                error = %e,
                "forward_body_read_error"
            );
            return DispatchOutcome::failed(destination, Some(status), None, &err);
        }
    };

    if !(200..300).contains(&status) {
        tracing::warn!(
            destination = destination.name(),
            status_code = status,
            "forward_unexpected_status"
        );
        return DispatchOutcome::failed(
            destination,
            Some(status),
            Some(text),
            &SendError::UnexpectedStatus(status),
        );
    }

    if let Some(expected) = &target.expected_response {
        if !text.contains(expected.as_str()) {
            tracing::warn!(
                destination = destination.name(),
                status_code = status,
                response_length = text.len(),
                "forward_unexpected_body"
            );
            return DispatchOutcome::failed(
                destination,
                Some(status),
                Some(text),
                &SendError::UnexpectedBody,
            );
        }
    }

    tracing::info!(
        destination = destination.name(),
        status_code = status,
        response_length = text.len(),
        "forward_complete"
    );

    DispatchOutcome::delivered(destination, status, text)
}
