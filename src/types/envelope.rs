use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messaging::Topic;

/// A typed message unit exchanged over the duplex channel.
///
/// Envelopes arrive from the remote as `{"type": ..., "payload": ..., "timestamp": ...}`
/// and are also synthesized locally for lifecycle signals. They are never mutated after
/// construction; the builder methods consume `self`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Topic>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(kind: impl Into<Topic>, payload: serde_json::Value) -> Self {
        Self {
            kind: Some(kind.into()),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// An envelope with no declared type; only `message` subscribers see it.
    pub fn untyped(payload: serde_json::Value) -> Self {
        Self {
            kind: None,
            payload,
            timestamp: Utc::now(),
        }
    }
}
