use super::{ClientState, ConnectionManager, SocketClient};
use crate::auth::CredentialStore;
use crate::infrastructure::BackoffPolicy;
use crate::messaging::EventRegistry;
use crate::types::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_RECONNECT_INTERVAL, LinkError, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Tunables for [`SocketClient`]. All durations are in milliseconds; `None` means default.
#[derive(Debug, Clone, Default)]
pub struct SocketClientOptions {
    /// Base reconnect interval. Default: 5000
    pub reconnect_interval: Option<u64>,
    /// Automatic reconnect attempts before giving up. Default: 10
    pub max_reconnect_attempts: Option<u32>,
    /// Ceiling on a single reconnect delay. Default: 30000
    pub max_reconnect_delay: Option<u64>,
    /// Heartbeat interval. Default: 30000
    pub heartbeat_interval: Option<u64>,
    /// Handshake timeout. Default: 20000
    pub connect_timeout: Option<u64>,
    /// Add random jitter to reconnect delays (never past the ceiling)
    pub jitter: bool,
}

impl SocketClientOptions {
    pub(crate) fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_interval.unwrap_or(DEFAULT_RECONNECT_INTERVAL)),
            Some(Duration::from_millis(
                self.max_reconnect_delay.unwrap_or(DEFAULT_MAX_RECONNECT_DELAY),
            )),
            self.max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        )
        .with_jitter(self.jitter)
    }

    pub(crate) fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL))
    }

    pub(crate) fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
    }
}

/// Builder for SocketClient that handles validation and wiring
pub struct SocketClientBuilder {
    endpoint: Url,
    options: SocketClientOptions,
    credentials: Option<CredentialStore>,
    registry: Option<Arc<EventRegistry>>,
}

impl SocketClientBuilder {
    /// Create a new builder
    pub fn new(endpoint: impl Into<String>, options: SocketClientOptions) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(LinkError::config("socket endpoint is required"));
        }

        let endpoint = Url::parse(&endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(LinkError::config(format!(
                "socket endpoint must use ws:// or wss://, got {}://",
                endpoint.scheme()
            )));
        }

        for (name, value) in [
            ("reconnect_interval", options.reconnect_interval),
            ("max_reconnect_delay", options.max_reconnect_delay),
            ("heartbeat_interval", options.heartbeat_interval),
            ("connect_timeout", options.connect_timeout),
        ] {
            if value == Some(0) {
                return Err(LinkError::config(format!("{} must be greater than zero", name)));
            }
        }

        Ok(Self {
            endpoint,
            options,
            credentials: None,
            registry: None,
        })
    }

    /// Share an existing credential store (defaults to an empty in-memory one)
    pub fn credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Publish into an existing registry (defaults to a fresh one)
    pub fn registry(mut self, registry: Arc<EventRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the client; no connection is opened yet
    pub fn build(self) -> SocketClient {
        SocketClient {
            backoff: self.options.backoff(),
            endpoint: self.endpoint,
            options: self.options,
            credentials: self.credentials.unwrap_or_else(CredentialStore::in_memory),
            registry: self.registry.unwrap_or_default(),
            connection: Arc::new(ConnectionManager::new()),
            state: Arc::new(Mutex::new(ClientState::new())),
        }
    }
}
