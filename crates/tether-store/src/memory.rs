//! In-memory token store.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{StoreError, StoredTokens, TokenStore};

/// A [`TokenStore`] that forgets everything when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<StoredTokens>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `tokens` (handy for restore tests).
    pub fn with_tokens(tokens: StoredTokens) -> Self {
        Self {
            slot: Mutex::new(Some(tokens)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<StoredTokens>> {
        // The guarded value is replaced whole, so a poisoned lock still
        // holds a complete record.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredTokens>, StoreError> {
        Ok(self.slot().clone())
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), StoreError> {
        *self.slot() = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_protocol::UserId;

    #[test]
    fn test_load_empty_store_returns_none() {
        let store = MemoryTokenStore::new();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_whole_record() {
        let store = MemoryTokenStore::new();
        store
            .save(&StoredTokens::new("a1", Some("r1".into()), Some(UserId::new("u1"))))
            .unwrap();
        store.save(&StoredTokens::new("a2", None, None)).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "a2");
        assert!(loaded.refresh_token.is_none());
        assert!(loaded.user_id.is_none());
    }

    #[test]
    fn test_clear_removes_record_and_is_idempotent() {
        let store = MemoryTokenStore::with_tokens(StoredTokens::new("a", None, None));
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
