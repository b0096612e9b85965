//! Authenticated requests with transparent token refresh.
//!
//! Every call that needs the bearer token goes through [`RequestGateway`].
//! It attaches the session's current access token, and when the server
//! answers 401 it refreshes once and reissues the request once.

use std::sync::Arc;

use rand::Rng;
use serde_json::Value;
use tether_transport::{ApiRequest, ApiResponse, Transport};
use tracing::{debug, warn};

use crate::refresh::RefreshCoordinator;
use crate::state::SessionCore;
use crate::{AuthBackend, SessionError};

/// Which try of a request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    /// After a refresh. A 401 now is final.
    Retry,
}

/// Sends requests with the session's bearer token attached.
pub struct RequestGateway<T, B> {
    transport: T,
    core: Arc<SessionCore>,
    refresher: Arc<RefreshCoordinator<B>>,
}

impl<T: Transport, B: AuthBackend> RequestGateway<T, B> {
    pub(crate) fn new(
        transport: T,
        core: Arc<SessionCore>,
        refresher: Arc<RefreshCoordinator<B>>,
    ) -> Self {
        Self {
            transport,
            core,
            refresher,
        }
    }

    /// Sends `request` as the signed-in user.
    ///
    /// The access token is read from the session on every attempt. The
    /// request id (generated when absent) is kept across the retry so both
    /// attempts correlate in server logs.
    ///
    /// Any status other than 401 is returned as-is, including errors.
    ///
    /// # Errors
    /// - [`SessionError::NotAuthenticated`] with no session. Nothing is
    ///   sent.
    /// - [`SessionError::SessionExpired`] if the 401 led to a refresh that
    ///   failed.
    /// - [`SessionError::Unauthorized`] if the retried request got 401 too.
    /// - [`SessionError::Network`] on transport failure.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let request_id = request.request_id.clone().unwrap_or_else(new_request_id);
        let mut attempt = Attempt::First;

        loop {
            let (token, _) = self.core.bearer()?;
            let outbound = request
                .clone()
                .with_bearer(token.as_str())
                .with_request_id(request_id.as_str());
            let response = self.transport.execute(outbound).await?;

            if !response.is_unauthorized() {
                return Ok(response);
            }

            match attempt {
                Attempt::Retry => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        request_id = %request_id,
                        "request still unauthorized after refresh"
                    );
                    return Err(SessionError::Unauthorized);
                }
                Attempt::First => {
                    debug!(
                        method = %request.method,
                        path = %request.path,
                        request_id = %request_id,
                        "unauthorized, refreshing before retry"
                    );
                    match self.refresher.refresh_after_rejection(&token).await {
                        Ok(()) => attempt = Attempt::Retry,
                        Err(SessionError::NotAuthenticated) => {
                            return Err(SessionError::NotAuthenticated);
                        }
                        Err(_) => return Err(SessionError::SessionExpired),
                    }
                }
            }
        }
    }

    /// [`send`](Self::send), then requires a 2xx and decodes the body.
    ///
    /// # Errors
    /// As `send`, plus [`SessionError::Validation`] / [`SessionError::Network`]
    /// for non-2xx statuses and [`SessionError::Protocol`] for bodies that
    /// don't decode.
    pub async fn send_json<R: serde::de::DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<R, SessionError> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(SessionError::from_status(&response));
        }
        response
            .json::<R>()
            .map_err(|e| SessionError::Protocol(format!("{path}: {e}")))
    }

    /// Convenience for a JSON `POST`.
    pub async fn post_json<R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<R, SessionError> {
        self.send_json(ApiRequest::post(path, body)).await
    }
}

/// A random 32-character hex correlation id.
fn new_request_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_id_is_32_hex_chars() {
        let id = new_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_request_id_is_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
