//! # Tether
//!
//! Session and token lifecycle management for clients of a phone/OTP
//! storefront API.
//!
//! Tether signs the user in with a one-time password, keeps the access
//! token fresh in the background, warns before the session runs out, and
//! attaches the bearer token (with one transparent refresh-and-retry) to
//! every authenticated call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # async fn run() -> Result<(), TetherError> {
//! let tether = TetherBuilder::new()
//!     .base_url("https://api.example.com")
//!     .store_path("session.json")
//!     .build()?;
//!
//! if !tether.session().is_authenticated() {
//!     tether.send_otp("+1 555 123 4567").await?;
//!     // ...ask the user for the code...
//!     tether.verify_otp("+1 555 123 4567", "123456").await?;
//! }
//!
//! let orders: serde_json::Value = tether
//!     .gateway()
//!     .send_json(ApiRequest::get("/orders"))
//!     .await?;
//! # let _ = orders;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate | Role |
//! |---|---|
//! | [`transport`] | `Transport` trait and the `reqwest` HTTP transport |
//! | [`protocol`] | auth endpoint bodies, token expiry, input checks |
//! | [`store`] | token persistence |
//! | [`schedule`] | warning and refresh timers |
//! | [`session`] | the session lifecycle itself |

mod client;
mod error;

pub use client::{Tether, TetherBuilder};
pub use error::TetherError;

pub use tether_protocol as protocol;
pub use tether_schedule as schedule;
pub use tether_session as session;
pub use tether_store as store;
pub use tether_transport as transport;

/// Everything a typical application needs.
pub mod prelude {
    pub use crate::{Tether, TetherBuilder, TetherError};
    pub use tether_session::{
        ActivityKind, LoginOutcome, Session, SessionConfig, SessionError, SessionStatus,
    };
    pub use tether_transport::{ApiRequest, ApiResponse, Method};
}
