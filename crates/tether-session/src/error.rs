//! Error types for the session layer.

use tether_protocol::{ErrorBody, ProtocolError};
use tether_store::StoreError;
use tether_transport::{ApiResponse, TransportError};

use crate::SessionStatus;

/// Errors that can occur during the session lifecycle.
///
/// `Clone` because one refresh outcome is handed to every caller that was
/// waiting on it. Wrapped errors from lower layers are therefore kept as
/// their rendered message rather than as a `source`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The phone number failed the local format check. Nothing was sent.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// The OTP failed the local format check. Nothing was sent.
    #[error("invalid one-time password: {0}")]
    InvalidOtp(String),

    /// The input was rejected, locally or by the server (HTTP 4xx).
    #[error("rejected: {0}")]
    Validation(String),

    /// The server couldn't be reached, or failed (HTTP 5xx). Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// A refresh failed. The session has already been cleared and the
    /// user must log in again.
    #[error("session expired")]
    SessionExpired,

    /// A refresh finished after the session it belonged to was signed out
    /// or replaced. The result was discarded. Never returned to callers.
    #[error("refresh result discarded: the session changed while it was in flight")]
    RefreshRaceIgnored,

    /// There is no signed-in session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The server rejected a request that was already retried with a
    /// fresh token.
    #[error("request unauthorized after token refresh")]
    Unauthorized,

    /// The operation isn't valid in the current status.
    #[error("not allowed while the session is {0}")]
    InvalidState(SessionStatus),

    /// A server body didn't match the endpoint's contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The token store failed while persisting a login.
    #[error("token store error: {0}")]
    Storage(String),
}

impl SessionError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Maps a non-2xx response: 4xx is the caller's fault, anything else
    /// is the server's.
    pub(crate) fn from_status(response: &ApiResponse) -> Self {
        let fallback = format!("HTTP {}", response.status);
        let message = ErrorBody::message_from(&response.body, &fallback);
        if (400..500).contains(&response.status) {
            Self::Validation(message)
        } else {
            Self::Network(message)
        }
    }

    /// Re-labels a 4xx rejection (`Validation`) as the step-specific
    /// variant built by `kind`. Other errors pass through.
    pub(crate) fn rejected_as(self, kind: fn(String) -> Self) -> Self {
        match self {
            Self::Validation(message) => kind(message),
            other => other,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidPhone(msg) => Self::InvalidPhone(msg),
            ProtocolError::InvalidOtp(msg) => Self::InvalidOtp(msg),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}
