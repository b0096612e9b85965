//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// Covers serialization of bodies and records, decoding of token claims,
/// and the local phone/OTP format checks.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: a server body missing a required field, or a
    /// truncated persisted record.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is structurally valid JSON but not what the endpoint
    /// contract promises.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A token could not be read: wrong shape, bad base64, or no usable
    /// `exp` claim.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The phone number failed the local format check.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// The OTP failed the local format check.
    #[error("invalid one-time password: {0}")]
    InvalidOtp(String),
}
