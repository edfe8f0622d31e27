use crate::infrastructure::TaskManager;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Lifecycle of the duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    /// Whether the lifecycle may move from `self` to `next`.
    ///
    /// There is no edge from `Disconnected` straight to `Connected`: every session goes
    /// through `Connecting` first.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connecting, Failed)
                | (Connecting, Disconnected)
                | (Connected, Reconnecting)
                | (Connected, Disconnected)
                | (Connected, Failed)
                | (Reconnecting, Connecting)
                | (Reconnecting, Failed)
                | (Reconnecting, Disconnected)
                | (Failed, Connecting)
                | (Failed, Disconnected)
        )
    }

    /// Offline but recovering on its own
    pub fn is_recovering(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Offline until someone calls `connect()`
    pub fn needs_action(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Point-in-time copy of the lifecycle, safe to hand to callers and subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleState {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
    #[serde(
        rename = "next_reconnect_delay_ms",
        serialize_with = "serialize_delay_ms"
    )]
    pub next_reconnect_delay: Option<Duration>,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            last_connected: None,
            last_disconnected: None,
            next_reconnect_delay: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_delay_ms<S>(delay: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match delay {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// Consolidated mutable state for SocketClient
/// Using a single struct keeps every transition under one lock
pub struct ClientState {
    pub lifecycle: LifecycleState,

    /// Bumped whenever a session starts or is torn down; tasks compare against it
    pub session: u64,

    /// Whether the last close was requested by us (prevents auto-reconnect)
    pub was_manual_disconnect: bool,

    /// Reader, heartbeat and reconnect timer for the current session
    pub task_manager: TaskManager,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            lifecycle: LifecycleState::new(),
            session: 0,
            was_manual_disconnect: false,
            task_manager: TaskManager::new(),
        }
    }

    /// Start a new session and return its number
    pub fn next_session(&mut self) -> u64 {
        self.session += 1;
        self.session
    }

    pub fn is_current(&self, session: u64) -> bool {
        self.session == session
    }

    /// Move the lifecycle to `next`, stamping connect/disconnect times.
    ///
    /// Returns `false` (and changes nothing) for an edge the state machine does not have.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        let current = self.lifecycle.state;
        if !current.can_transition_to(next) {
            tracing::warn!(from = ?current, to = ?next, "Rejected invalid state transition");
            return false;
        }

        match next {
            ConnectionState::Connected => {
                self.lifecycle.last_connected = Some(Utc::now());
                self.lifecycle.reconnect_attempts = 0;
                self.lifecycle.next_reconnect_delay = None;
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                if current == ConnectionState::Connected {
                    self.lifecycle.last_disconnected = Some(Utc::now());
                }
                self.lifecycle.next_reconnect_delay = None;
            }
            ConnectionState::Reconnecting => {
                if current == ConnectionState::Connected {
                    self.lifecycle.last_disconnected = Some(Utc::now());
                }
            }
            ConnectionState::Connecting => {}
        }

        tracing::debug!(from = ?current, to = ?next, "Connection state transition");
        self.lifecycle.state = next;
        true
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
