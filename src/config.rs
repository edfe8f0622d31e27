//! Endpoint addresses and tunables for both clients, with an environment overlay.

use crate::client::SocketClientOptions;
use crate::http::ApiClientOptions;
use crate::types::{DEFAULT_SOCKET_URL, LinkError, Result};
use std::str::FromStr;

pub const ENV_API_URL: &str = "GENESIS_API_URL";
pub const ENV_WS_URL: &str = "GENESIS_WS_URL";
pub const ENV_API_TIMEOUT_MS: &str = "GENESIS_API_TIMEOUT_MS";
pub const ENV_API_RETRIES: &str = "GENESIS_API_RETRIES";
pub const ENV_WS_RECONNECT_INTERVAL_MS: &str = "GENESIS_WS_RECONNECT_INTERVAL_MS";
pub const ENV_WS_MAX_RECONNECT_ATTEMPTS: &str = "GENESIS_WS_MAX_RECONNECT_ATTEMPTS";
pub const ENV_WS_MAX_RECONNECT_DELAY_MS: &str = "GENESIS_WS_MAX_RECONNECT_DELAY_MS";
pub const ENV_HEARTBEAT_INTERVAL_MS: &str = "GENESIS_HEARTBEAT_INTERVAL_MS";

/// Everything needed to build a [`SocketClient`](crate::SocketClient) and an
/// [`ApiClient`](crate::ApiClient) that talk to the same backend.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub socket_url: String,
    pub socket: SocketClientOptions,
    pub api: ApiClientOptions,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            socket: SocketClientOptions::default(),
            api: ApiClientOptions::default(),
        }
    }
}

impl LinkConfig {
    /// Defaults overlaid with whatever `GENESIS_*` variables are set.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Config`] naming the variable when a numeric value does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.api.base_url = Some(url);
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            config.socket_url = url;
        }

        config.api.timeout = parse_var(&lookup, ENV_API_TIMEOUT_MS)?;
        config.api.max_retries = parse_var(&lookup, ENV_API_RETRIES)?;
        config.socket.reconnect_interval = parse_var(&lookup, ENV_WS_RECONNECT_INTERVAL_MS)?;
        config.socket.max_reconnect_attempts =
            parse_var(&lookup, ENV_WS_MAX_RECONNECT_ATTEMPTS)?;
        config.socket.max_reconnect_delay = parse_var(&lookup, ENV_WS_MAX_RECONNECT_DELAY_MS)?;
        config.socket.heartbeat_interval = parse_var(&lookup, ENV_HEARTBEAT_INTERVAL_MS)?;

        tracing::debug!(
            api = config.api.base_url.as_deref().unwrap_or("<default>"),
            socket = %config.socket_url,
            "Loaded link configuration"
        );
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| LinkError::config(format!("{} = {:?}: {}", key, raw, e))),
    }
}
