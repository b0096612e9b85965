//! Unified error type for Tether.

use tether_protocol::ProtocolError;
use tether_session::SessionError;
use tether_store::StoreError;
use tether_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tether` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// The HTTP client couldn't be built or a request couldn't be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A body or token couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The token store couldn't be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Login, refresh or an authenticated call failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl TetherError {
    /// The session error inside, if that's what this is.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: TetherError = TransportError::Connect("refused".into()).into();
        assert!(matches!(err, TetherError::Transport(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: TetherError = ProtocolError::MalformedToken("bad".into()).into();
        assert!(matches!(err, TetherError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error_is_transparent() {
        let err: TetherError = SessionError::SessionExpired.into();
        assert_eq!(err.to_string(), "session expired");
        assert_eq!(err.as_session(), Some(&SessionError::SessionExpired));
    }
}
