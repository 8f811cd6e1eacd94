//! Server configuration.

use crate::error::{ServerError, ServerResult};
use logux_protocol::{ProcessingError, ProtocolPolicy, DEFAULT_PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Path the endpoint is mounted on unless configured otherwise.
pub const DEFAULT_ROOT_PATH: &str = "/logux";

/// Default request body limit (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Hook invoked with every failure caught while a batch is streamed.
pub type ErrorCallback = Arc<dyn Fn(&ProcessingError) + Send + Sync>;

/// Configuration for the back-end server.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Path the endpoint answers on.
    pub root_path: String,
    /// Accepted back-end protocol versions.
    pub supported_versions: RangeInclusive<u32>,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    secret: Zeroizing<String>,
    on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("root_path", &self.root_path)
            .field("supported_versions", &self.supported_versions)
            .field("max_body_size", &self.max_body_size)
            .field("secret", &"<redacted>")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl ServerConfig {
    /// Creates a new server configuration with the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 31338)),
            root_path: DEFAULT_ROOT_PATH.to_string(),
            supported_versions: DEFAULT_PROTOCOL_VERSION..=DEFAULT_PROTOCOL_VERSION,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            secret: Zeroizing::new(secret.into()),
            on_error: None,
        }
    }

    /// Sets the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the endpoint path.
    pub fn with_root_path(mut self, path: impl Into<String>) -> Self {
        self.root_path = path.into();
        self
    }

    /// Sets the accepted protocol versions.
    pub fn with_supported_versions(mut self, versions: RangeInclusive<u32>) -> Self {
        self.supported_versions = versions;
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Registers a hook called with every processing failure.
    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProcessingError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Returns the error hook, if any.
    pub fn on_error(&self) -> Option<&ErrorCallback> {
        self.on_error.as_ref()
    }

    /// Checks that the configuration can serve requests.
    ///
    /// An empty secret is refused: it would let any client that omits the
    /// secret through.
    pub fn validate(&self) -> ServerResult<()> {
        if self.secret.is_empty() {
            return Err(ServerError::Config("secret must not be empty".into()));
        }
        if !self.root_path.starts_with('/') {
            return Err(ServerError::Config(format!(
                "root path must start with '/': {:?}",
                self.root_path
            )));
        }
        if self.supported_versions.is_empty() {
            return Err(ServerError::Config(format!(
                "no supported protocol versions in {:?}",
                self.supported_versions
            )));
        }
        Ok(())
    }

    /// Builds the validation policy for this configuration.
    pub fn policy(&self) -> ProtocolPolicy {
        ProtocolPolicy::new(self.secret.as_bytes())
            .with_supported_versions(self.supported_versions.clone())
    }
}
