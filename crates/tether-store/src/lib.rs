//! Durable token persistence for Tether.
//!
//! The store is deliberately dumb: it keeps the three persisted session
//! entries (bearer token, refresh token, user id) and nothing else. It
//! doesn't know what an expiry is, never validates a token, and never
//! decides when to clear itself. All policy lives in the session layer.
//!
//! # Implementations
//!
//! - [`MemoryTokenStore`]: process-local, for tests and ephemeral sessions.
//! - [`FileTokenStore`]: one record on disk, replaced atomically on every
//!   write so it survives restarts and crashes mid-write.

mod error;
mod file;
mod memory;

pub use error::StoreError;
pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_protocol::UserId;

/// The persisted part of a session.
///
/// Written and read as ONE record so a reader never observes a new access
/// token paired with an old refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    /// Bearer token attached to outbound calls.
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl StoredTokens {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user_id: Option<UserId>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            user_id,
        }
    }
}

impl fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredTokens")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Key/value persistence for the session's credentials.
///
/// Methods are synchronous: sign-out must complete before it returns, and
/// the records are a few hundred bytes.
pub trait TokenStore: Send + Sync + 'static {
    /// Returns the stored record, or `None` if nothing is stored.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the backing medium can't be read,
    /// [`StoreError::Corrupt`] if it holds something undecodable.
    fn load(&self) -> Result<Option<StoredTokens>, StoreError>;

    /// Replaces the stored record.
    ///
    /// # Errors
    /// [`StoreError`] if the record could not be written durably.
    fn save(&self, tokens: &StoredTokens) -> Result<(), StoreError>;

    /// Removes all three entries. Clearing an empty store succeeds.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the record exists but couldn't be removed.
    fn clear(&self) -> Result<(), StoreError>;
}

impl<S: TokenStore + ?Sized> TokenStore for Arc<S> {
    fn load(&self) -> Result<Option<StoredTokens>, StoreError> {
        (**self).load()
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), StoreError> {
        (**self).save(tokens)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}
