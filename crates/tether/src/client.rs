//! `TetherBuilder`: one call from a base URL to a working session.
//!
//! Ties the layers together: HTTP transport → auth backend → token store
//! → session lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tether_session::{HttpAuthBackend, SessionConfig, SessionLifecycle};
use tether_store::{FileTokenStore, MemoryTokenStore, TokenStore};
use tether_transport::HttpTransport;
use tracing::info;

use crate::TetherError;

/// A session manager talking HTTP to the storefront API.
pub type Tether = SessionLifecycle<HttpAuthBackend<HttpTransport>, HttpTransport>;

/// Builder for a [`Tether`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), tether::TetherError> {
/// let tether = tether::TetherBuilder::new()
///     .base_url("https://api.example.com")
///     .store_path("/var/lib/myapp/session.json")
///     .build()?;
///
/// if tether.session().is_authenticated() {
///     // restored from disk
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TetherBuilder {
    base_url: Option<String>,
    store_path: Option<PathBuf>,
    session_config: SessionConfig,
    request_timeout: Option<Duration>,
    user_agent: Option<String>,
    restore: bool,
}

impl TetherBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            store_path: None,
            session_config: SessionConfig::default(),
            request_timeout: None,
            user_agent: None,
            restore: true,
        }
    }

    /// The API base URL. Required.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Persist tokens to this file. Without it, tokens live in memory only
    /// and every start is signed out.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Timeout for every individual HTTP request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Whether `build` picks up a persisted session. Default: `true`.
    pub fn restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    /// Builds the transport, store and session, restoring a persisted
    /// session when enabled.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    /// - [`TetherError::Transport`] if no base URL was given or the HTTP
    ///   client can't be built.
    /// - [`TetherError::Session`] if a persisted session can't be read.
    pub fn build(self) -> Result<Tether, TetherError> {
        let mut transport = HttpTransport::builder();
        if let Some(url) = self.base_url {
            transport = transport.base_url(url);
        }
        if let Some(timeout) = self.request_timeout {
            transport = transport.timeout(timeout);
        }
        if let Some(agent) = self.user_agent {
            transport = transport.user_agent(agent);
        }
        let transport = transport.build()?;

        let store: Arc<dyn TokenStore> = match self.store_path {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };

        let base_url = transport.base_url().to_owned();
        let tether = SessionLifecycle::new(
            HttpAuthBackend::new(transport.clone()),
            transport,
            store,
            self.session_config,
        );

        if self.restore {
            tether.restore()?;
        }
        info!(%base_url, status = %tether.status(), "tether ready");
        Ok(tether)
    }
}

impl Default for TetherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
