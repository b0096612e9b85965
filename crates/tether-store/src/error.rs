//! Error types for the token store.

use std::io;
use std::path::PathBuf;

use tether_protocol::ProtocolError;

/// Errors that can occur while reading or writing persisted tokens.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing file could not be read, written, or removed.
    #[error("token store I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record exists but can't be decoded. The caller decides whether
    /// to clear it; the store never deletes data on its own.
    #[error("token store record is corrupt: {0}")]
    Corrupt(#[source] ProtocolError),

    /// The record could not be serialized.
    #[error("token store record could not be encoded: {0}")]
    Encode(#[source] ProtocolError),
}
