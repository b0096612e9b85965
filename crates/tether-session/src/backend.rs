//! The auth API as seen by the session layer.
//!
//! [`AuthBackend`] covers the three unauthenticated calls a session needs:
//! sending an OTP, verifying it, and exchanging a refresh token. Production
//! code uses [`HttpAuthBackend`]; tests swap in a scripted fake.

use std::future::Future;
use std::sync::Arc;

use tether_protocol::{
    Endpoint, Refresh, RefreshResponse, SendOtp, VerifyOtp, VerifyOtpResponse,
};
use tether_transport::Transport;
use tracing::debug;

use crate::SessionError;

/// The unauthenticated half of the auth API.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → the backend is shared between the lifecycle
///   and spawned refresh tasks.
/// - Returned futures are `Send` so a refresh can run on its own task.
///
/// # Errors
///
/// Implementations report a rejected number as [`SessionError::InvalidPhone`],
/// a rejected code as [`SessionError::InvalidOtp`], other server-side 4xx
/// as [`SessionError::Validation`], transport failures and 5xx as
/// [`SessionError::Network`], and bodies that don't decode as
/// [`SessionError::Protocol`].
pub trait AuthBackend: Send + Sync + 'static {
    /// `POST /auth/otp/send` for an already-normalized phone number.
    fn send_otp(&self, phone: &str) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// `POST /auth/otp/verify`.
    fn verify_otp(
        &self,
        phone: &str,
        otp: &str,
    ) -> impl Future<Output = Result<VerifyOtpResponse, SessionError>> + Send;

    /// `POST /auth/refresh`.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshResponse, SessionError>> + Send;
}

impl<B: AuthBackend> AuthBackend for Arc<B> {
    fn send_otp(&self, phone: &str) -> impl Future<Output = Result<(), SessionError>> + Send {
        (**self).send_otp(phone)
    }

    fn verify_otp(
        &self,
        phone: &str,
        otp: &str,
    ) -> impl Future<Output = Result<VerifyOtpResponse, SessionError>> + Send {
        (**self).verify_otp(phone, otp)
    }

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshResponse, SessionError>> + Send {
        (**self).refresh(refresh_token)
    }
}

// ---------------------------------------------------------------------------
// HttpAuthBackend
// ---------------------------------------------------------------------------

/// [`AuthBackend`] over any [`Transport`], speaking the storefront's JSON.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend<T> {
    transport: T,
}

impl<T: Transport> HttpAuthBackend<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// POSTs `body` to its endpoint and decodes a 2xx answer.
    async fn call<E>(&self, body: E) -> Result<E::Response, SessionError>
    where
        E: Endpoint + Send,
    {
        let request = body.to_request()?;
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            debug!(path = E::PATH, status = response.status, "auth call rejected");
            return Err(SessionError::from_status(&response));
        }
        response
            .json::<E::Response>()
            .map_err(|e| SessionError::Protocol(format!("{}: {e}", E::PATH)))
    }
}

impl<T: Transport> AuthBackend for HttpAuthBackend<T> {
    async fn send_otp(&self, phone: &str) -> Result<(), SessionError> {
        self.call(SendOtp {
            phone: phone.to_owned(),
        })
        .await
        .map(|_| ())
        .map_err(|e| e.rejected_as(SessionError::InvalidPhone))
    }

    async fn verify_otp(&self, phone: &str, otp: &str) -> Result<VerifyOtpResponse, SessionError> {
        self.call(VerifyOtp {
            phone: phone.to_owned(),
            otp: otp.to_owned(),
        })
        .await
        .map_err(|e| e.rejected_as(SessionError::InvalidOtp))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, SessionError> {
        self.call(Refresh {
            refresh_token: refresh_token.to_owned(),
        })
        .await
    }
}
