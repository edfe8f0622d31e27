use crate::types::constants::wire_events;
use serde::{Deserialize, Serialize};

/// Type-safe topics for publish/subscribe dispatch.
///
/// Built-in lifecycle signals and the message kinds the Genesis backend is known to push
/// get their own variant; any other `type` tag an envelope declares becomes
/// [`Topic::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Topic {
    /// Connection status changes (`connected`, `disconnected`, `failed`)
    Connection,

    /// Full lifecycle snapshot after every transition
    StateChange,

    /// Connection or socket errors
    Error,

    /// The remote rejected our credentials
    AuthError,

    /// Automatic reconnection gave up
    MaxReconnectAttempts,

    /// Every inbound envelope, unfiltered
    Message,

    /// Client liveness signal
    Ping,

    /// Remote liveness reply
    Pong,

    /// Agent status broadcast
    AgentStatus,

    /// Task update broadcast
    TaskUpdate,

    /// Code generation progress
    CodeGeneration,

    /// Collaboration events
    Collaboration,

    /// Generic notification
    Notification,

    /// Any other remote-declared type
    Custom(String),
}

impl Topic {
    /// Parse a wire name into a Topic
    pub fn parse(s: &str) -> Self {
        match s {
            wire_events::CONNECTION => Self::Connection,
            wire_events::STATE_CHANGE => Self::StateChange,
            wire_events::ERROR => Self::Error,
            wire_events::AUTH_ERROR => Self::AuthError,
            wire_events::MAX_RECONNECT_ATTEMPTS => Self::MaxReconnectAttempts,
            wire_events::MESSAGE => Self::Message,
            wire_events::PING => Self::Ping,
            wire_events::PONG => Self::Pong,
            wire_events::AGENT_STATUS => Self::AgentStatus,
            wire_events::TASK_UPDATE => Self::TaskUpdate,
            wire_events::CODE_GENERATION => Self::CodeGeneration,
            wire_events::COLLABORATION => Self::Collaboration,
            wire_events::NOTIFICATION => Self::Notification,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Convert topic to its wire name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connection => wire_events::CONNECTION,
            Self::StateChange => wire_events::STATE_CHANGE,
            Self::Error => wire_events::ERROR,
            Self::AuthError => wire_events::AUTH_ERROR,
            Self::MaxReconnectAttempts => wire_events::MAX_RECONNECT_ATTEMPTS,
            Self::Message => wire_events::MESSAGE,
            Self::Ping => wire_events::PING,
            Self::Pong => wire_events::PONG,
            Self::AgentStatus => wire_events::AGENT_STATUS,
            Self::TaskUpdate => wire_events::TASK_UPDATE,
            Self::CodeGeneration => wire_events::CODE_GENERATION,
            Self::Collaboration => wire_events::COLLABORATION,
            Self::Notification => wire_events::NOTIFICATION,
            Self::Custom(s) => s,
        }
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        match topic {
            Topic::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status carried by `connection` envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Failed,
}

/// Payload of a `connection` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSignal {
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectionSignal {
    pub fn connected() -> Self {
        Self {
            status: ConnectionStatus::Connected,
            reason: None,
        }
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}
