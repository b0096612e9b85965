//! Transport abstraction layer for Tether.
//!
//! Provides the [`Transport`] trait that abstracts over how a single
//! request/response exchange with the storefront API is carried out, plus
//! the plain data types that cross it ([`ApiRequest`], [`ApiResponse`]).
//!
//! The session layer never talks to `reqwest` directly. Everything it needs
//! from the network goes through this trait, which keeps the refresh and
//! retry logic testable with scripted in-memory transports.
//!
//! # Feature Flags
//!
//! - `http` (default): HTTP transport via `reqwest` ([`HttpTransport`])

mod error;
#[cfg(feature = "http")]
mod http;

pub use error::TransportError;
#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportBuilder};

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A single outbound API call.
///
/// `path` is relative to the transport's base URL (`/auth/refresh`, not a
/// full URL). The bearer token is optional because the OTP and refresh
/// endpoints are called without one.
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
    pub request_id: Option<String>,
}

impl ApiRequest {
    /// Creates a request with no body, bearer, or request id.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
            request_id: None,
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Shorthand for a `POST` request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).json(body)
    }

    /// Sets the JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the bearer token sent in the `Authorization` header.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Sets the correlation id sent in [`REQUEST_ID_HEADER`].
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

// Hand-written so bearer tokens never end up in logs via `{:?}`.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &self.body)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// The raw outcome of an [`ApiRequest`]: a status code and body bytes.
///
/// Non-2xx statuses are NOT transport errors. Deciding what a 401 or a
/// 422 means is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response from a status and raw body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response whose body is the serialized JSON value.
    pub fn json_body(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `true` when the server rejected the credentials (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decodes the body as JSON.
    ///
    /// An empty body decodes as `null`, so endpoints that answer `{}` or
    /// nothing at all both work with `serde_json::Value` or `()`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return serde_json::from_slice(b"null");
        }
        serde_json::from_slice(&self.body)
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Executes [`ApiRequest`]s against the remote API.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one transport is shared by the gateway, the
///   auth backend and spawned refresh tasks.
/// - The returned future is `Send` so refreshes can run on a spawned task.
pub trait Transport: Send + Sync + 'static {
    /// Sends the request and returns whatever the server answered.
    ///
    /// # Errors
    /// Returns a [`TransportError`] only when no HTTP response was
    /// obtained (connection refused, timeout, malformed request).
    fn execute(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn execute(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send {
        (**self).execute(request)
    }
}
