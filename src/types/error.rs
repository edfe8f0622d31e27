use thiserror::Error;

/// Errors that can occur when talking to the Genesis backend.
#[derive(Error, Debug)]
pub enum LinkError {
    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The duplex channel could not be established or was dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote rejected our credentials (socket handshake or renewal)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Every automatic reconnect attempt failed
    #[error("Reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Network-level failure that survived every local retry
    #[error("Request failed after {attempts} attempts: {source}")]
    TransientRequest {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The call was rejected again after its single renewal-and-retry
    #[error("Authorization rejected after credential renewal")]
    RenewalExhausted,

    /// Renewal was needed but no renewal credential is stored
    #[error("No renewal credential available")]
    NoRenewalCredential,

    /// Non-success HTTP status surfaced unmodified
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Request construction or non-transient transport error
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Credential persistence failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Invalid client options
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl LinkError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures that need user action (sign in again) rather than waiting.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::RenewalExhausted | Self::NoRenewalCredential
        )
    }
}

/// Convenience type alias for `Result<T, LinkError>`.
pub type Result<T> = std::result::Result<T, LinkError>;
