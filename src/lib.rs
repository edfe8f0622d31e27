//! # Genesis Link
//!
//! Resilient network layer for the Genesis engine: a WebSocket client that keeps one
//! realtime channel alive (reconnect with capped backoff, heartbeat, topic fan-out) and
//! an HTTP client that attaches credentials, renews them once on `401`, and retries
//! transient failures. Both share one [`CredentialStore`].
//!
//! ## Example
//!
//! ```no_run
//! use genesis_link::{ApiClient, CredentialStore, LinkConfig, SocketClient, Topic};
//! use genesis_link::http::RequestOptions;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LinkConfig::from_env()?;
//!     let credentials = CredentialStore::in_memory();
//!
//!     let api = ApiClient::new(config.api.clone(), credentials.clone())?;
//!     api.login("dev@example.com", "secret").await?;
//!
//!     let socket = SocketClient::new(config.socket_url, config.socket, credentials)?;
//!     socket.subscribe(Topic::AgentStatus, |payload| println!("agent: {}", payload));
//!     socket.connect().await?;
//!
//!     let projects = api.get::<Value>("/projects", RequestOptions::default()).await?;
//!     println!("{:?}", projects.data);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod http;
pub mod infrastructure;
pub mod messaging;
pub mod types;

pub use auth::{CredentialPair, CredentialStore, FileStorage, MemoryStorage, TokenStorage};
pub use client::{ConnectionState, LifecycleState, SocketClient, SocketClientOptions};
pub use config::LinkConfig;
pub use http::{ApiClient, ApiClientOptions, ApiResponse};
pub use infrastructure::BackoffPolicy;
pub use messaging::{ConnectionSignal, ConnectionStatus, EventRegistry, SubscriptionId, Topic};
pub use types::{Envelope, LinkError, Result};
