use super::{EventRegistry, Topic};
use crate::types::Envelope;
use std::sync::Arc;

/// What the socket reader should do after an envelope has been routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to subscribers; keep reading
    Delivered,
    /// The remote rejected our credentials; the session must fail without reconnecting
    AuthRejected(String),
}

/// Routes inbound envelopes to registry subscribers
pub struct MessageRouter {
    registry: Arc<EventRegistry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    /// Routes a message to the appropriate handler(s)
    ///
    /// Every envelope goes to `message` subscribers whole; a typed envelope additionally
    /// goes to subscribers of its own topic with just the payload.
    pub fn route(&self, envelope: Envelope) -> RouteOutcome {
        if envelope.kind == Some(Topic::Pong) {
            tracing::debug!("Received heartbeat reply");
        }

        match serde_json::to_value(&envelope) {
            Ok(whole) => {
                self.registry.publish(&Topic::Message, whole);
            }
            Err(e) => tracing::error!("Failed to re-encode envelope for message subscribers: {}", e),
        }

        let Some(kind) = envelope.kind else {
            return RouteOutcome::Delivered;
        };

        tracing::debug!(topic = %kind, "Routing envelope");
        let reason = (kind == Topic::AuthError).then(|| auth_reason(&envelope.payload));
        self.registry.publish(&kind, envelope.payload);

        match reason {
            Some(reason) => RouteOutcome::AuthRejected(reason),
            None => RouteOutcome::Delivered,
        }
    }
}

fn auth_reason(payload: &serde_json::Value) -> String {
    payload
        .get("message")
        .or_else(|| payload.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| "credentials rejected by remote".to_string())
}
