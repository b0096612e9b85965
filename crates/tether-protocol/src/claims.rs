//! Reading the expiry claim out of a JWT-shaped token.
//!
//! The session layer schedules everything off the refresh token's `exp`
//! claim. It does NOT verify the signature; the server does that on every
//! call. It only needs to know when the server will stop accepting the
//! token.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::ProtocolError;

/// Decodes the `exp` claim of a `header.payload.signature` token.
///
/// `exp` may be an integer, a fractional number, or a numeric string
/// (seconds since the Unix epoch). Trailing `=` padding on the payload
/// segment is tolerated.
///
/// # Errors
/// Returns [`ProtocolError::MalformedToken`] if the token does not have
/// three segments, the payload is not base64url JSON, or `exp` is missing,
/// non-numeric, non-positive or out of range. Callers must treat this as
/// "expiry unknown" and fail closed.
pub fn decode_expiry(token: &str) -> Result<SystemTime, ProtocolError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments[1].is_empty() {
        return Err(ProtocolError::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| ProtocolError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let claims: Value = serde_json::from_slice(&payload)
        .map_err(|e| ProtocolError::MalformedToken(format!("payload is not JSON: {e}")))?;

    let exp = claims
        .get("exp")
        .ok_or_else(|| ProtocolError::MalformedToken("missing exp claim".into()))?;

    let secs = match exp {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ProtocolError::MalformedToken("exp claim is not numeric".into()))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(ProtocolError::MalformedToken(format!(
            "exp claim out of range: {secs}"
        )));
    }

    let offset = Duration::try_from_secs_f64(secs)
        .map_err(|_| ProtocolError::MalformedToken(format!("exp claim out of range: {secs}")))?;

    UNIX_EPOCH
        .checked_add(offset)
        .ok_or_else(|| ProtocolError::MalformedToken(format!("exp claim out of range: {secs}")))
}
