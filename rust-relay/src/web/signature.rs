//! Samsara webhook signature verification.
//!
//! Samsara signs each webhook with HMAC-SHA256 over the canonical message
//! `v1:<timestamp>:<raw body>`, keyed by the base64-decoded webhook secret,
//! and sends the result as `X-Samsara-Signature: v1=<hex digest>`.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Version prefix used in both the canonical message and the signature header.
pub const SIGNATURE_VERSION: &str = "v1";

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// The shared webhook secret, already decoded to raw key bytes.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// Decode a secret from its base64 configuration value.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        BASE64.decode(encoded.trim()).map(Self)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Build the canonical message `v1:<timestamp>:<body>`.
///
/// The body bytes are appended exactly as received.
fn canonical_message(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNATURE_VERSION.len() + timestamp.len() + body.len() + 2);
    message.extend_from_slice(SIGNATURE_VERSION.as_bytes());
    message.push(b':');
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b':');
    message.extend_from_slice(body);
    message
}

/// Compute the `v1=<hex>` signature for a timestamp and raw body.
pub fn compute_signature(
    secret: &SigningSecret,
    timestamp: &str,
    body: &[u8],
) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(&canonical_message(timestamp, body));
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{}={}", SIGNATURE_VERSION, digest))
}

/// Verify a Samsara webhook signature.
///
/// Returns `false` for any failure, including an unavailable secret, so the
/// caller always gets a definitive accept/reject answer.
pub fn verify_signature(
    secret: Option<&SigningSecret>,
    timestamp: &str,
    body: &[u8],
    provided_signature: &str,
) -> bool {
    let Some(secret) = secret else {
        warn!("signature_secret_unavailable");
        return false;
    };

    let expected = match compute_signature(secret, timestamp, body) {
        Ok(sig) => sig,
        Err(_) => {
            warn!("signature_invalid_key");
            return false;
        }
    };

    let valid: bool = expected.as_bytes().ct_eq(provided_signature.as_bytes()).into();

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = provided_signature.len(),
            body_length = body.len(),
            "signature_mismatch"
        );
    }

    valid
}

/// Check that a signature header has the shape `v1=<64 hex chars>`.
pub fn is_well_formed_signature(signature: &str) -> bool {
    signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
        .map(|digest| {
            digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
        })
        .unwrap_or(false)
}
