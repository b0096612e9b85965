/// Errors that can occur in the transport layer.
///
/// Only failures to obtain a response live here. An HTTP error status is
/// a successful exchange from the transport's point of view.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport was built with missing or invalid settings.
    #[error("invalid transport configuration: {0}")]
    Configuration(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request failed for any other reason (TLS, body read, redirect).
    #[error("request failed: {0}")]
    Request(String),
}
