//! Request and response bodies of the storefront auth API.
//!
//! Field names follow the server's camelCase JSON (`refreshToken`,
//! `isNewUser`). Every request body implements [`Endpoint`], which ties it
//! to its path and response type so the session layer never hardcodes a
//! path next to a body.

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use tether_transport::ApiRequest;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A storefront user's identifier.
///
/// The API is not consistent about id types, so this accepts both JSON
/// strings and integers and always stores the textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a user id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) if s.is_empty() => Err(de::Error::custom("user id must not be empty")),
            Raw::Text(s) => Ok(Self(s)),
            Raw::Number(n) => Ok(Self(n.to_string())),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The user profile returned by OTP verification and name updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Some deployments send Mongo-style `_id`.
    #[serde(alias = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

// ---------------------------------------------------------------------------
// Endpoint trait
// ---------------------------------------------------------------------------

/// A request body bound to the path it is POSTed to.
pub trait Endpoint: Serialize {
    /// Path relative to the API base URL.
    const PATH: &'static str;

    /// The body a 2xx response decodes into.
    type Response: DeserializeOwned;

    /// Builds the unauthenticated [`ApiRequest`] for this body.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the body can't be serialized.
    fn to_request(&self) -> Result<ApiRequest, ProtocolError> {
        let body = serde_json::to_value(self).map_err(ProtocolError::Encode)?;
        Ok(ApiRequest::post(Self::PATH, body))
    }
}

// ---------------------------------------------------------------------------
// OTP login
// ---------------------------------------------------------------------------

/// `POST /auth/otp/send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOtp {
    pub phone: String,
}

/// The send endpoint answers `{}`; anything else in the body is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendOtpResponse {}

impl Endpoint for SendOtp {
    const PATH: &'static str = "/auth/otp/send";
    type Response = Option<SendOtpResponse>;
}

/// `POST /auth/otp/verify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOtp {
    pub phone: String,
    pub otp: String,
}

/// A successful verification: the token pair, the user, and whether this
/// is their first login (and so still needs a name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: User,
    #[serde(default)]
    pub is_new_user: bool,
}

impl Endpoint for VerifyOtp {
    const PATH: &'static str = "/auth/otp/verify";
    type Response = VerifyOtpResponse;
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// `POST /auth/name` (bearer required).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetNameResponse {
    pub user: User,
}

impl Endpoint for SetName {
    const PATH: &'static str = "/auth/name";
    type Response = SetNameResponse;
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// `POST /auth/refresh`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refresh {
    pub refresh_token: String,
}

// Never print the credential.
impl fmt::Debug for Refresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refresh")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// A new access token, and a rotated refresh token when the server rotates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Endpoint for Refresh {
    const PATH: &'static str = "/auth/refresh";
    type Response = RefreshResponse;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The `{error}` body returned on failure. Some handlers use `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Extracts a human-readable message from a raw error body.
    ///
    /// Falls back to `fallback` (usually the status text) when the body is
    /// not JSON or carries neither field.
    pub fn message_from(body: &[u8], fallback: &str) -> String {
        serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}
