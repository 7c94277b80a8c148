//! Webhook signature verification.
//!
//! Two schemes are in play:
//!
//! - The payment provider signs `"{timestamp}.{body}"` with HMAC-SHA256
//!   and sends `t=<unix>,v1=<hex>` in a single header.
//! - The email provider uses a three-header message-signing scheme: a
//!   message ID, a timestamp, and `v1,<base64>` signatures over
//!   `"{id}.{timestamp}.{body}"`, keyed by a base64 secret with a
//!   `whsec_` prefix.
//!
//! Both check a replay window and compare signatures in constant time.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

/// Maximum allowed clock skew between the signed timestamp and now.
const TOLERANCE_SECS: i64 = 300;

/// Signature verification failures.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Header or secret could not be parsed.
    #[error("malformed signature: {0}")]
    Malformed(String),

    /// Signed timestamp outside the replay window.
    #[error("signature timestamp outside tolerance")]
    Expired,

    /// Signature did not match the body.
    #[error("signature mismatch")]
    Mismatch,
}

/// Verify the payment provider's `t=<unix>,v1=<hex>` signature header.
///
/// # Errors
///
/// Returns [`SignatureError`] if the header is malformed, the timestamp is
/// outside the replay window, or no `v1` candidate matches.
pub fn verify_payment_signature(
    secret: &SecretString,
    header: &str,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| SignatureError::Malformed("invalid timestamp".into()))?,
                );
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SignatureError::Malformed("missing timestamp".into()))?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed("missing v1 signature".into()));
    }
    check_tolerance(timestamp, now_unix)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // A provider mid-secret-rotation signs with several keys; any match
    // passes.
    if candidates
        .iter()
        .any(|candidate| constant_time_eq(expected.as_bytes(), candidate.as_bytes()))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify the email provider's three-header signature.
///
/// `signature_header` may carry several space-delimited `v1,<base64>`
/// entries; any match passes.
///
/// # Errors
///
/// Returns [`SignatureError`] if the secret or headers are malformed, the
/// timestamp is outside the replay window, or no signature matches.
pub fn verify_email_signature(
    secret: &SecretString,
    message_id: &str,
    timestamp: &str,
    signature_header: &str,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::Malformed("invalid timestamp".into()))?;
    check_tolerance(ts, now_unix)?;

    let key_b64 = secret
        .expose_secret()
        .strip_prefix("whsec_")
        .unwrap_or(secret.expose_secret());
    let key = BASE64
        .decode(key_b64)
        .map_err(|_| SignatureError::Malformed("secret is not base64".into()))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    mac.update(message_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = BASE64.encode(mac.finalize().into_bytes());

    let matched = signature_header.split_whitespace().any(|entry| {
        entry
            .split_once(',')
            .is_some_and(|(version, sig)| {
                version == "v1" && constant_time_eq(expected.as_bytes(), sig.as_bytes())
            })
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Constant-time byte comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

fn check_tolerance(timestamp: i64, now_unix: i64) -> Result<(), SignatureError> {
    if (now_unix - timestamp).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }
    Ok(())
}
