//! Wire protocol for Tether.
//!
//! This crate defines what the session layer and the storefront auth API
//! say to each other:
//!
//! - **Types** ([`SendOtp`], [`VerifyOtp`], [`Refresh`], [`User`], etc.):
//!   the request and response bodies of the four auth endpoints, each tied
//!   to its path through the [`Endpoint`] trait.
//! - **Claims** ([`decode_expiry`]): reading the `exp` claim out of a
//!   JWT-shaped refresh token without verifying it.
//! - **Validation** ([`normalize_phone`], [`normalize_otp`]): the local
//!   format checks that run before anything reaches the network.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how persisted records are
//!   turned into bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (ApiRequest/ApiResponse) → Protocol (typed bodies) → Session
//! ```

mod claims;
mod codec;
mod error;
mod types;
mod validate;

pub use claims::decode_expiry;
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Endpoint, ErrorBody, Refresh, RefreshResponse, SendOtp, SendOtpResponse,
    SetName, SetNameResponse, User, UserId, VerifyOtp, VerifyOtpResponse,
};
pub use validate::{normalize_otp, normalize_phone};
