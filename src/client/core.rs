use super::{
    ClientState, ConnectionManager, ConnectionState, LifecycleState, SocketClientBuilder,
    SocketClientOptions, connection::WsStream,
};
use crate::auth::CredentialStore;
use crate::infrastructure::{BackoffPolicy, HeartbeatManager, TaskKind};
use crate::messaging::{
    ConnectionSignal, EventRegistry, MessageRouter, RouteOutcome, SubscriptionId, Topic,
};
use crate::types::{
    Envelope, LinkError, Result, SOCKET_TOKEN_PARAM, request_events,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{SplitStream, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

/// Envelopes queued while the state lock is held, published once it is released
type Signals = Vec<(Topic, Value)>;

/// Why a handshake did not produce a socket
enum HandshakeFailure {
    /// The remote refused our credentials; do not retry
    Rejected(String),
    /// Anything else; worth another attempt
    Transient(String),
}

/// Keeps one long-lived socket to the Genesis backend alive.
///
/// `SocketClient` owns the duplex channel and its lifecycle
/// (`Disconnected → Connecting → Connected → Reconnecting → Failed`), sends a heartbeat
/// while connected, reconnects with capped exponential backoff after unexpected drops,
/// and fans inbound envelopes out to topic subscribers.
///
/// Connection-level failures are not returned from some later call; they are published on
/// the [`Topic::Connection`], [`Topic::Error`], [`Topic::AuthError`] and
/// [`Topic::MaxReconnectAttempts`] topics, and every transition publishes a
/// [`Topic::StateChange`] snapshot.
///
/// # Example
///
/// ```no_run
/// use genesis_link::{CredentialStore, SocketClient, SocketClientOptions, Topic};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SocketClient::new(
///     "ws://localhost:8000/ws",
///     SocketClientOptions::default(),
///     CredentialStore::in_memory(),
/// )?;
///
/// client.subscribe(Topic::TaskUpdate, |payload| {
///     println!("task update: {}", payload);
/// });
///
/// client.connect().await?;
/// client.subscribe_to_task("task-42").await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SocketClient {
    pub(crate) endpoint: Url,
    pub(crate) options: SocketClientOptions,
    pub(crate) backoff: BackoffPolicy,

    // Shared with the API client
    pub(crate) credentials: CredentialStore,

    pub(crate) registry: Arc<EventRegistry>,

    // Write half of the live socket
    pub(crate) connection: Arc<ConnectionManager>,

    // Consolidated mutable state
    pub(crate) state: Arc<Mutex<ClientState>>,
}

impl SocketClient {
    /// Creates a new SocketClient.
    ///
    /// This validates the options but does not open a connection; call
    /// [`connect()`](Self::connect) for that.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::UrlParse`] or [`LinkError::Config`] for a malformed endpoint or
    /// zero-valued intervals.
    pub fn new(
        endpoint: impl Into<String>,
        options: SocketClientOptions,
        credentials: CredentialStore,
    ) -> Result<Self> {
        SocketClientBuilder::new(endpoint, options).map(|b| b.credentials(credentials).build())
    }

    /// Opens the socket, presenting the current access token.
    ///
    /// Does nothing if the client is already connecting or connected. From `Failed` or
    /// `Disconnected` the reconnect counter starts over; from `Reconnecting` the pending
    /// timer is cancelled and the attempt happens now.
    ///
    /// A missing access token is not an error; the handshake proceeds unauthenticated and
    /// the remote decides.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Authentication`] if the remote rejects the credentials. The client is
    ///   left `Failed` and will not retry on its own.
    /// - [`LinkError::ReconnectExhausted`] if this attempt failed and no attempts are left.
    ///
    /// - [`LinkError::Cancelled`] if [`disconnect()`](Self::disconnect) stopped the
    ///   handshake before it finished.
    ///
    /// Any other failure schedules a reconnect, is reported on the [`Topic::Error`] topic,
    /// and returns `Ok(())`.
    ///
    /// The handshake runs as a background task. Dropping the returned future only stops
    /// waiting for the outcome; the attempt and any reconnects it schedules carry on.
    pub async fn connect(&self) -> Result<()> {
        let mut signals = Signals::new();
        let attempt = {
            let mut state = self.state.lock().await;
            match state.lifecycle.state {
                ConnectionState::Connecting | ConnectionState::Connected => return Ok(()),
                ConnectionState::Reconnecting => state.task_manager.abort(TaskKind::Reconnect),
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    state.lifecycle.reconnect_attempts = 0;
                }
            }

            state.was_manual_disconnect = false;
            state.transition(ConnectionState::Connecting);
            signals.push(state_signal(&state.lifecycle));
            let session = state.next_session();
            self.spawn_attempt(&mut state, session, signals)
        };

        // The sender is dropped unanswered only when the attempt was aborted.
        attempt.await.unwrap_or(Err(LinkError::Cancelled))
    }

    /// Closes the socket and stops every timer.
    ///
    /// The pending reconnect timer, any handshake in flight and the heartbeat are cancelled
    /// before the socket is released, and the close is marked manual so it never triggers a
    /// reconnect. The client ends up `Disconnected` from any state; the close frame goes out
    /// after the state lock is released.
    pub async fn disconnect(&self) {
        let mut signals = Signals::new();
        let writer = {
            let mut state = self.state.lock().await;
            let previous = state.lifecycle.state;
            if previous == ConnectionState::Disconnected {
                return;
            }

            tracing::info!("Disconnecting from socket server");
            state.was_manual_disconnect = true;
            state.next_session();

            state.task_manager.abort(TaskKind::Reconnect);
            state.task_manager.abort(TaskKind::Connect);
            state.task_manager.abort(TaskKind::Heartbeat);
            state.task_manager.abort(TaskKind::Reader);

            state.transition(ConnectionState::Disconnected);
            signals.push(state_signal(&state.lifecycle));
            if previous == ConnectionState::Connected {
                signals.push(connection_signal(ConnectionSignal::disconnected(
                    "client disconnect",
                )));
            }
            self.connection.take_writer().await
        };
        self.publish_all(signals);

        if let Some(writer) = writer {
            ConnectionManager::close_writer(writer).await;
        }
        tracing::info!("Disconnected from socket server");
    }

    /// Best-effort send of `data` under `topic`.
    ///
    /// When the client is not connected the message is dropped with a warning; it is
    /// never queued and never an error.
    pub async fn send(&self, topic: impl Into<Topic>, data: Value) {
        let topic = topic.into();
        if !self.is_connected().await {
            tracing::warn!(topic = %topic, "Socket not connected, message not sent");
            return;
        }

        let envelope = Envelope::new(topic.clone(), data);
        match self.connection.send_envelope(&envelope).await {
            Ok(true) => tracing::debug!(topic = %topic, "Sent message"),
            Ok(false) => tracing::warn!(topic = %topic, "Socket closed, message not sent"),
            Err(e) => tracing::warn!(topic = %topic, "Failed to send message: {}", e),
        }
    }

    /// Registers `callback` for `topic`; callbacks run in registration order.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.registry.subscribe(topic, callback)
    }

    /// Removes one callback, or all callbacks for `topic` when `subscription` is `None`.
    pub fn unsubscribe(
        &self,
        topic: impl Into<Topic>,
        subscription: Option<SubscriptionId>,
    ) -> usize {
        self.registry.unsubscribe(&topic.into(), subscription)
    }

    /// Snapshot of the current lifecycle.
    pub async fn state(&self) -> LifecycleState {
        self.state.lock().await.lifecycle.clone()
    }

    /// Checks whether the socket is currently connected.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.lifecycle.is_connected()
    }

    pub fn registry(&self) -> Arc<EventRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Join a collaboration room
    pub async fn join_room(&self, room_id: &str) {
        self.send(request_events::JOIN_ROOM, json!({ "room_id": room_id }))
            .await;
    }

    /// Leave a collaboration room
    pub async fn leave_room(&self, room_id: &str) {
        self.send(request_events::LEAVE_ROOM, json!({ "room_id": room_id }))
            .await;
    }

    pub async fn send_collaboration(&self, data: Value) {
        self.send(Topic::Collaboration, data).await;
    }

    /// Ask the remote to push `agent_status`, for one agent or all of them
    pub async fn request_agent_status(&self, agent_id: Option<&str>) {
        self.send(
            request_events::GET_AGENT_STATUS,
            json!({ "agent_id": agent_id }),
        )
        .await;
    }

    pub async fn subscribe_to_task(&self, task_id: &str) {
        self.send(request_events::SUBSCRIBE_TASK, json!({ "task_id": task_id }))
            .await;
    }

    pub async fn unsubscribe_from_task(&self, task_id: &str) {
        self.send(
            request_events::UNSUBSCRIBE_TASK,
            json!({ "task_id": task_id }),
        )
        .await;
    }

    /// Endpoint with the access token attached, read at the moment of the call
    fn endpoint_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(token) = self.credentials.access_token() {
            url.query_pairs_mut().append_pair(SOCKET_TOKEN_PARAM, &token);
        }
        url
    }

    /// Runs the handshake for `session` as the tracked [`TaskKind::Connect`] task.
    ///
    /// `signals` are published from the task before it dials. The receiver yields the
    /// outcome; nobody has to listen for the attempt to complete.
    fn spawn_attempt(
        &self,
        state: &mut ClientState,
        session: u64,
        signals: Signals,
    ) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        state.task_manager.spawn(TaskKind::Connect, async move {
            this.publish_all(signals);
            let result = this.open_session(session).await;
            if let Err(e) = &result {
                tracing::warn!(session, "Connection attempt ended: {}", e);
            }
            let _ = tx.send(result);
        });
        rx
    }

    /// Performs the handshake for `session` and wires up the reader and heartbeat.
    async fn open_session(&self, session: u64) -> Result<()> {
        let url = self.endpoint_url();
        tracing::info!(session, "Connecting to {}", self.endpoint);

        let handshake = tokio::time::timeout(
            self.options.handshake_timeout(),
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await;

        let outcome = match handshake {
            Ok(Ok((ws_stream, _response))) => Ok(ws_stream),
            Ok(Err(e)) => Err(classify_handshake_error(&e)),
            Err(_) => Err(HandshakeFailure::Transient("handshake timed out".to_string())),
        };

        match outcome {
            Ok(ws_stream) => {
                self.on_handshake_success(session, ws_stream).await;
                Ok(())
            }
            Err(HandshakeFailure::Rejected(reason)) => {
                tracing::error!("Socket authentication failed: {}", reason);
                self.fail_session(session, &reason, true).await;
                Err(LinkError::authentication(reason))
            }
            Err(HandshakeFailure::Transient(reason)) => {
                tracing::error!("Socket connection error: {}", reason);
                self.on_handshake_failure(session, reason).await
            }
        }
    }

    async fn on_handshake_success(&self, session: u64, ws_stream: WsStream) {
        let (write_half, read_half) = ws_stream.split();

        let mut signals = Signals::new();
        {
            let mut state = self.state.lock().await;
            if !state.is_current(session) || state.lifecycle.state != ConnectionState::Connecting
            {
                tracing::info!(session, "Session superseded during handshake, dropping socket");
                return;
            }

            self.connection.set_writer(session, write_half).await;
            state.transition(ConnectionState::Connected);

            let reader = self.clone().read_loop(session, read_half);
            state.task_manager.spawn(TaskKind::Reader, reader);

            let heartbeat = HeartbeatManager::new(
                Arc::downgrade(&self.connection),
                session,
                self.options.heartbeat(),
            );
            state.task_manager.spawn(TaskKind::Heartbeat, heartbeat.run());

            signals.push(state_signal(&state.lifecycle));
            signals.push(connection_signal(ConnectionSignal::connected()));
        }
        self.publish_all(signals);
        tracing::info!(session, "Connected to socket server");
    }

    async fn on_handshake_failure(&self, session: u64, reason: String) -> Result<()> {
        let error = LinkError::connection(reason);
        let mut signals = vec![(
            Topic::Error,
            json!({ "type": "connection_error", "error": error.to_string() }),
        )];

        let scheduled = {
            let mut state = self.state.lock().await;
            if !state.is_current(session) {
                return Ok(());
            }
            self.schedule_reconnect(&mut state, session, &mut signals)
        };
        self.publish_all(signals);

        match scheduled {
            Ok(_) => Ok(()),
            Err(attempts) => Err(LinkError::ReconnectExhausted { attempts }),
        }
    }

    /// Arms the reconnect timer, or moves to `Failed` when the budget is spent.
    ///
    /// Returns the scheduled delay, or the number of attempts made when none are left.
    fn schedule_reconnect(
        &self,
        state: &mut ClientState,
        session: u64,
        signals: &mut Signals,
    ) -> std::result::Result<Duration, u32> {
        let attempts = state.lifecycle.reconnect_attempts;
        if !self.backoff.allows(attempts) {
            tracing::error!(attempts, "Max reconnection attempts reached");
            state.transition(ConnectionState::Failed);
            signals.push(state_signal(&state.lifecycle));
            signals.push((
                Topic::MaxReconnectAttempts,
                json!({ "attempts": attempts }),
            ));
            signals.push(connection_signal(ConnectionSignal::failed(
                "max reconnect attempts reached",
            )));
            return Err(attempts);
        }

        let delay = self.backoff.delay_for_attempt(attempts);
        state.lifecycle.reconnect_attempts = attempts + 1;
        state.lifecycle.next_reconnect_delay = Some(delay);
        state.transition(ConnectionState::Reconnecting);
        tracing::info!(
            attempt = attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection attempt"
        );

        let timer = self.clone().reconnect_after(session, delay);
        state.task_manager.spawn(TaskKind::Reconnect, timer);
        signals.push(state_signal(&state.lifecycle));
        Ok(delay)
    }

    /// The reconnect timer. Hands the handshake to a [`TaskKind::Connect`] task and exits.
    fn reconnect_after(self, session: u64, delay: Duration) -> BoxFuture<'static, ()> {
        async move {
            tokio::time::sleep(delay).await;

            let mut state = self.state.lock().await;
            if !state.is_current(session) || state.lifecycle.state != ConnectionState::Reconnecting
            {
                return;
            }
            state.task_manager.release(TaskKind::Reconnect);
            state.transition(ConnectionState::Connecting);
            let signals = vec![state_signal(&state.lifecycle)];
            let next = state.next_session();

            tracing::info!(session = next, "Attempting to reconnect...");
            // Outcome is logged by the attempt itself.
            let _ = self.spawn_attempt(&mut state, next, signals);
        }
        .boxed()
    }

    /// Reads frames for `session` until the socket goes away.
    async fn read_loop(self, session: u64, mut read_half: SplitStream<WsStream>) {
        tracing::info!(session, "Starting read task");
        let router = MessageRouter::new(Arc::clone(&self.registry));

        while let Some(msg_result) = read_half.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    tracing::debug!("Received text message: {}", text);
                    match serde_json::from_str::<Envelope>(&text) {
                        Ok(envelope) => {
                            if let RouteOutcome::AuthRejected(reason) = router.route(envelope) {
                                tracing::error!("Socket authentication error: {}", reason);
                                self.fail_session(session, &reason, false).await;
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Failed to parse message: {} - Raw: {}", e, text);
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    let reason = match frame {
                        Some(close_frame) => {
                            tracing::warn!(
                                "Server closed connection: code={:?}, reason='{}'",
                                close_frame.code,
                                close_frame.reason
                            );
                            format!("server closed connection ({})", u16::from(close_frame.code))
                        }
                        None => {
                            tracing::warn!("Server closed connection without close frame");
                            "server closed connection".to_string()
                        }
                    };
                    self.handle_channel_closed(session, reason).await;
                    return;
                }
                Ok(Message::Ping(data)) => {
                    tracing::debug!("Received ping ({} bytes)", data.len());
                }
                Ok(Message::Pong(data)) => {
                    tracing::debug!("Received pong ({} bytes)", data.len());
                }
                Ok(Message::Binary(data)) => {
                    tracing::warn!("Received unexpected binary message ({} bytes)", data.len());
                }
                Ok(Message::Frame(_)) => {
                    tracing::debug!("Received raw frame (internal)");
                }
                Err(e) => {
                    tracing::error!("Socket read error: {}", e);
                    self.registry.publish(
                        &Topic::Error,
                        json!({ "type": "socket_error", "error": e.to_string() }),
                    );
                    self.handle_channel_closed(session, e.to_string()).await;
                    return;
                }
            }
        }

        self.handle_channel_closed(session, "stream ended".to_string())
            .await;
    }

    /// The remote went away without us asking: tear down and schedule a reconnect.
    async fn handle_channel_closed(&self, session: u64, reason: String) {
        let mut signals = Signals::new();
        {
            let mut state = self.state.lock().await;
            if !state.is_current(session)
                || state.was_manual_disconnect
                || state.lifecycle.state != ConnectionState::Connected
            {
                return;
            }

            tracing::warn!(session, "Socket disconnected: {}", reason);
            state.task_manager.abort(TaskKind::Heartbeat);
            state.task_manager.release(TaskKind::Reader);
            self.connection.clear_writer().await;

            signals.push(connection_signal(ConnectionSignal::disconnected(reason)));
            let _ = self.schedule_reconnect(&mut state, session, &mut signals);
        }
        self.publish_all(signals);
    }

    /// Credentials rejected: stop everything and stay `Failed` until `connect()`.
    ///
    /// `notify` publishes the `auth_error` topic; the reader path skips it because the
    /// router has already delivered the remote's own `auth_error` envelope.
    async fn fail_session(&self, session: u64, reason: &str, notify: bool) {
        let mut signals = Signals::new();
        let writer = {
            let mut state = self.state.lock().await;
            if !state.is_current(session) {
                return;
            }

            state.next_session();
            state.task_manager.abort(TaskKind::Reconnect);
            state.task_manager.abort(TaskKind::Heartbeat);
            state.task_manager.release(TaskKind::Reader);

            state.transition(ConnectionState::Failed);
            signals.push(state_signal(&state.lifecycle));
            if notify {
                signals.push((Topic::AuthError, json!({ "message": reason })));
            }
            signals.push(connection_signal(ConnectionSignal::failed(reason)));
            self.connection.take_writer().await
        };
        self.publish_all(signals);

        if let Some(writer) = writer {
            ConnectionManager::close_writer(writer).await;
        }
    }

    fn publish_all(&self, signals: Signals) {
        for (topic, payload) in signals {
            self.registry.publish(&topic, payload);
        }
    }
}

fn classify_handshake_error(err: &tungstenite::Error) -> HandshakeFailure {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            HandshakeFailure::Rejected(format!(
                "handshake rejected with status {}",
                response.status()
            ))
        }
        other => HandshakeFailure::Transient(other.to_string()),
    }
}

fn state_signal(lifecycle: &LifecycleState) -> (Topic, Value) {
    (
        Topic::StateChange,
        serde_json::to_value(lifecycle).unwrap_or_default(),
    )
}

fn connection_signal(signal: ConnectionSignal) -> (Topic, Value) {
    (
        Topic::Connection,
        serde_json::to_value(signal).unwrap_or_default(),
    )
}
