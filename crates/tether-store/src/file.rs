//! File-backed token store.
//!
//! The whole record lives in one file. Writes go to a sibling temporary
//! file which is flushed and then renamed over the target, so the file on
//! disk is always either the previous record or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tether_protocol::{Codec, JsonCodec};

use crate::{StoreError, StoredTokens, TokenStore};

/// A [`TokenStore`] persisted to a single file.
///
/// On Unix the file is created with mode `0600`: it holds bearer
/// credentials.
#[derive(Debug, Clone)]
pub struct FileTokenStore<C: Codec = JsonCodec> {
    path: PathBuf,
    codec: C,
}

impl FileTokenStore<JsonCodec> {
    /// Creates a JSON store at `path`. Nothing is touched until the first
    /// call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_codec(path, JsonCodec)
    }
}

impl<C: Codec> FileTokenStore<C> {
    /// Creates a store at `path` using a custom record codec.
    pub fn with_codec(path: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            path: path.into(),
            codec,
        }
    }

    /// Where the record lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl<C: Codec> TokenStore for FileTokenStore<C> {
    fn load(&self) -> Result<Option<StoredTokens>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };
        let tokens = self.codec.decode(&bytes).map_err(StoreError::Corrupt)?;
        Ok(Some(tokens))
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), StoreError> {
        let bytes = self.codec.encode(tokens).map_err(StoreError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let temp = self.temp_path();
        let mut file = open_private(&temp).map_err(|e| self.io_error(&temp, e))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| self.io_error(&temp, e))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(|e| self.io_error(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "token record written");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "token record removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(&self.path, e)),
        }
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_sibling() {
        let store = FileTokenStore::new("/var/lib/app/session.json");
        assert_eq!(store.temp_path(), PathBuf::from("/var/lib/app/session.json.tmp"));
    }
}
