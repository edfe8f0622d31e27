use crate::client::ConnectionManager;
use crate::messaging::Topic;
use crate::types::Envelope;
use std::future::Future;
use std::sync::Weak;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Sends a `ping` envelope on a fixed interval for one socket session.
///
/// The task exits on its own as soon as the socket it was started for is no longer the
/// live one, so a beat can never leak into a later session. Replies are not awaited;
/// a dead socket shows up as a read error on the reader side.
pub struct HeartbeatManager {
    interval: Duration,
    session: u64,
    connection: Weak<ConnectionManager>,
}

impl HeartbeatManager {
    pub fn new(connection: Weak<ConnectionManager>, session: u64, interval: Duration) -> Self {
        Self {
            interval,
            session,
            connection,
        }
    }

    /// The heartbeat loop; hand it to a task manager to run it
    pub fn run(self) -> impl Future<Output = ()> + Send + 'static {
        async move {
            let start = Instant::now() + self.interval;
            let mut interval_timer = time::interval_at(start, self.interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                let Some(connection) = self.connection.upgrade() else {
                    // Client dropped, exit heartbeat task
                    break;
                };

                let beat = Envelope::new(Topic::Ping, serde_json::Value::Null);
                match connection.send_for(self.session, &beat).await {
                    Ok(true) => tracing::debug!(session = self.session, "Sent heartbeat"),
                    Ok(false) => {
                        tracing::debug!(session = self.session, "Session closed, stopping heartbeat");
                        break;
                    }
                    Err(e) => tracing::error!("[Heartbeat] Failed to send: {}", e),
                }
            }
        }
    }
}
