use futures::{SinkExt, StreamExt};
use genesis_link::{
    ConnectionState, CredentialPair, CredentialStore, LinkError, SocketClient,
    SocketClientOptions, Topic,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};

type ServerSocket = WebSocketStream<TcpStream>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_options() -> SocketClientOptions {
    SocketClientOptions {
        reconnect_interval: Some(20),
        max_reconnect_delay: Some(100),
        max_reconnect_attempts: Some(5),
        heartbeat_interval: Some(10_000),
        connect_timeout: Some(2_000),
        jitter: false,
    }
}

fn client_for(addr: SocketAddr, options: SocketClientOptions) -> SocketClient {
    SocketClient::new(
        format!("ws://{}/ws", addr),
        options,
        CredentialStore::in_memory(),
    )
    .unwrap()
}

/// Forward every payload published on `topic` into a channel.
fn watch(client: &SocketClient, topic: impl Into<Topic>) -> UnboundedReceiver<Value> {
    let (tx, rx) = unbounded_channel();
    client.subscribe(topic, move |payload| {
        let _ = tx.send(payload);
    });
    rx
}

async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

async fn wait_for_status(rx: &mut UnboundedReceiver<Value>, status: &str) -> Value {
    loop {
        let signal = next(rx).await;
        if signal["status"] == status {
            return signal;
        }
    }
}

/// Accepts TCP connections and never answers the handshake.
async fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            held.push(stream);
        }
    });
    addr
}

/// Reports the `type` of every text frame the server receives.
async fn drain_types(mut ws: ServerSocket, types: UnboundedSender<String>) {
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            let _ = types.send(value["type"].as_str().unwrap_or_default().to_string());
        }
    }
}

#[tokio::test]
async fn test_connect_without_credentials_attaches_no_token() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, mut uri_rx) = unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| {
            let _ = uri_tx.send(req.uri().to_string());
            Ok::<Response, ErrorResponse>(resp)
        };
        let ws = accept_hdr_async(stream, callback).await.unwrap();
        let (types, _rx) = unbounded_channel();
        drain_types(ws, types).await;
    });

    let client = client_for(addr, fast_options());
    let mut connection = watch(&client, Topic::Connection);

    client.connect().await.unwrap();

    assert_eq!(next(&mut uri_rx).await, "/ws");
    assert_eq!(next(&mut connection).await["status"], "connected");
    let state = client.state().await;
    assert_eq!(state.state, ConnectionState::Connected);
    assert_eq!(state.reconnect_attempts, 0);
    assert!(state.last_connected.is_some());

    client.disconnect().await;
}

#[tokio::test]
async fn test_connect_presents_current_access_token() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, mut uri_rx) = unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| {
            let _ = uri_tx.send(req.uri().to_string());
            Ok::<Response, ErrorResponse>(resp)
        };
        let ws = accept_hdr_async(stream, callback).await.unwrap();
        let (types, _rx) = unbounded_channel();
        drain_types(ws, types).await;
    });

    let credentials = CredentialStore::in_memory();
    credentials
        .store(CredentialPair::new("access-1", "renew-1"))
        .unwrap();
    let client = SocketClient::new(format!("ws://{}/ws", addr), fast_options(), credentials)
        .unwrap();

    client.connect().await.unwrap();

    assert_eq!(next(&mut uri_rx).await, "/ws?token=access-1");
    client.disconnect().await;
}

#[tokio::test]
async fn test_inbound_envelopes_reach_generic_and_typed_subscribers_in_order() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for n in 0..3 {
            let envelope = json!({
                "type": "task_update",
                "payload": {"n": n},
                "timestamp": "2024-05-01T12:00:00Z"
            });
            ws.send(Message::Text(envelope.to_string().into()))
                .await
                .unwrap();
        }
        let unknown = json!({"type": "build_log", "payload": {"line": "ok"}});
        ws.send(Message::Text(unknown.to_string().into()))
            .await
            .unwrap();
        let (types, _rx) = unbounded_channel();
        drain_types(ws, types).await;
    });

    let client = client_for(addr, fast_options());
    let mut messages = watch(&client, Topic::Message);
    let mut updates = watch(&client, Topic::TaskUpdate);
    let mut custom = watch(&client, "build_log");

    client.connect().await.unwrap();

    for n in 0..3 {
        assert_eq!(next(&mut updates).await, json!({"n": n}));
        let whole = next(&mut messages).await;
        assert_eq!(whole["type"], "task_update");
        assert_eq!(whole["payload"]["n"], n);
    }
    assert_eq!(next(&mut custom).await["line"], "ok");
    assert_eq!(next(&mut messages).await["type"], "build_log");

    client.disconnect().await;
}

#[tokio::test]
async fn test_heartbeat_while_connected_and_none_after_disconnect() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (types_tx, mut types_rx) = unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drain_types(ws, types_tx).await;
    });

    let client = client_for(
        addr,
        SocketClientOptions {
            heartbeat_interval: Some(50),
            ..fast_options()
        },
    );
    client.connect().await.unwrap();

    assert_eq!(next(&mut types_rx).await, "ping");
    assert_eq!(next(&mut types_rx).await, "ping");

    client.disconnect().await;
    while types_rx.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(types_rx.try_recv().is_err());
    assert_eq!(client.state().await.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_send_and_room_helpers_reach_server() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, mut frames_rx) = unbounded_channel::<Value>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = frames_tx.send(serde_json::from_str(text.as_str()).unwrap());
            }
        }
    });

    let client = client_for(addr, fast_options());

    // Not connected yet: dropped, not queued.
    client.send(Topic::Collaboration, json!({"early": true})).await;

    client.connect().await.unwrap();
    client.join_room("room-7").await;
    client.subscribe_to_task("task-42").await;

    let frame = next(&mut frames_rx).await;
    assert_eq!(frame["type"], "join_room");
    assert_eq!(frame["payload"]["room_id"], "room-7");
    let frame = next(&mut frames_rx).await;
    assert_eq!(frame["type"], "subscribe_task");
    assert_eq!(frame["payload"]["task_id"], "task-42");

    client.disconnect().await;
}

#[tokio::test]
async fn test_remote_close_triggers_reconnect() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // First session is closed by the server right away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = ws.close(None).await;

        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (types, _rx) = unbounded_channel();
        drain_types(ws, types).await;
    });

    let client = client_for(addr, fast_options());
    let mut connection = watch(&client, Topic::Connection);
    let mut states = watch(&client, Topic::StateChange);

    client.connect().await.unwrap();

    wait_for_status(&mut connection, "connected").await;
    wait_for_status(&mut connection, "disconnected").await;
    wait_for_status(&mut connection, "connected").await;

    let mut saw_reconnecting = false;
    while let Ok(snapshot) = states.try_recv() {
        if snapshot["state"] == "reconnecting" {
            saw_reconnecting = true;
            assert_eq!(snapshot["next_reconnect_delay_ms"], 20);
        }
    }
    assert!(saw_reconnecting);

    let state = client.state().await;
    assert_eq!(state.state, ConnectionState::Connected);
    assert_eq!(state.reconnect_attempts, 0);
    assert!(state.last_disconnected.is_some());

    client.disconnect().await;
}

#[tokio::test]
async fn test_exhausted_attempts_end_in_failed() {
    init_tracing();
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let client = client_for(
        addr,
        SocketClientOptions {
            max_reconnect_attempts: Some(2),
            ..fast_options()
        },
    );
    let mut exhausted = watch(&client, Topic::MaxReconnectAttempts);
    let mut errors = watch(&client, Topic::Error);

    // The first failure only schedules a retry.
    client.connect().await.unwrap();
    let error = next(&mut errors).await;
    assert_eq!(error["type"], "connection_error");
    assert!(error["error"].as_str().unwrap().starts_with("Connection error: "));

    assert_eq!(next(&mut exhausted).await, json!({"attempts": 2}));
    let state = client.state().await;
    assert_eq!(state.state, ConnectionState::Failed);
    assert!(state.state.needs_action());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.state().await.state, ConnectionState::Failed);
    assert!(exhausted.try_recv().is_err());
}

#[tokio::test]
async fn test_handshake_rejection_fails_without_reconnect() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            let reject = |_req: &Request, _resp: Response| {
                let response = tokio_tungstenite::tungstenite::http::Response::builder()
                    .status(401)
                    .body(Some("invalid token".to_string()))
                    .unwrap();
                Err::<Response, ErrorResponse>(response)
            };
            let _ = accept_hdr_async(stream, reject).await;
        }
    });

    let client = client_for(addr, fast_options());
    let mut auth_errors = watch(&client, Topic::AuthError);

    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, LinkError::Authentication(_)));
    assert!(err.is_auth_failure());
    next(&mut auth_errors).await;
    assert_eq!(client.state().await.state, ConnectionState::Failed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert_eq!(client.state().await.state, ConnectionState::Failed);
}

#[tokio::test]
async fn test_remote_auth_error_fails_session() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            let mut ws = accept_async(stream).await.unwrap();
            let envelope = json!({"type": "auth_error", "payload": {"message": "token expired"}});
            ws.send(Message::Text(envelope.to_string().into()))
                .await
                .unwrap();
            tokio::spawn(async move { while ws.next().await.is_some() {} });
        }
    });

    let client = client_for(addr, fast_options());
    let mut auth_errors = watch(&client, Topic::AuthError);
    let mut connection = watch(&client, Topic::Connection);

    client.connect().await.unwrap();

    assert_eq!(next(&mut auth_errors).await["message"], "token expired");
    let failed = wait_for_status(&mut connection, "failed").await;
    assert_eq!(failed["reason"], "token expired");
    assert_eq!(client.state().await.state, ConnectionState::Failed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connect_after_failure_starts_over() {
    init_tracing();
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let client = client_for(
        addr,
        SocketClientOptions {
            max_reconnect_attempts: Some(0),
            ..fast_options()
        },
    );

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, LinkError::ReconnectExhausted { attempts: 0 }));
    assert_eq!(client.state().await.state, ConnectionState::Failed);

    // Explicit connect is allowed out of Failed and disconnect always lands in Disconnected.
    assert!(client.connect().await.is_err());
    client.disconnect().await;
    assert_eq!(client.state().await.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_abandoned_connect_keeps_reconnecting() {
    init_tracing();
    let addr = silent_server().await;

    let client = client_for(
        addr,
        SocketClientOptions {
            connect_timeout: Some(300),
            ..fast_options()
        },
    );
    let mut states = watch(&client, Topic::StateChange);
    let mut errors = watch(&client, Topic::Error);

    // The caller gives up long before the handshake times out.
    let abandoned = timeout(Duration::from_millis(50), client.connect()).await;
    assert!(abandoned.is_err());

    let error = next(&mut errors).await;
    assert_eq!(error["type"], "connection_error");
    assert!(error["error"].as_str().unwrap().contains("handshake timed out"));

    loop {
        let snapshot = next(&mut states).await;
        if snapshot["state"] == "reconnecting" {
            assert_eq!(snapshot["reconnect_attempts"], 1);
            break;
        }
    }

    // Reconnecting is not a terminal state; connect() cuts the timer short.
    let state = client.state().await;
    assert_ne!(state.state, ConnectionState::Disconnected);
    assert_ne!(state.state, ConnectionState::Failed);

    client.disconnect().await;
    assert_eq!(client.state().await.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_during_handshake_cancels_connect() {
    init_tracing();
    let addr = silent_server().await;

    let client = client_for(addr, fast_options());
    let mut errors = watch(&client, Topic::Error);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.state().await.state, ConnectionState::Connecting);

    client.disconnect().await;

    let result = timeout(Duration::from_secs(1), pending)
        .await
        .expect("connect still waiting after disconnect")
        .unwrap();
    assert!(matches!(result, Err(LinkError::Cancelled)));

    // The aborted handshake never reports a timeout or schedules a retry.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(errors.try_recv().is_err());
    assert_eq!(client.state().await.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_sends_close_frame() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (close_tx, mut close_rx) = unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Close(frame) = msg {
                let frame = frame.map(|f| (u16::from(f.code), f.reason.as_str().to_string()));
                let _ = close_tx.send(frame);
                break;
            }
        }
    });

    let client = client_for(addr, fast_options());
    let mut connection = watch(&client, Topic::Connection);
    client.connect().await.unwrap();
    wait_for_status(&mut connection, "connected").await;

    client.disconnect().await;

    let frame = next(&mut close_rx).await;
    assert_eq!(frame, Some((1000, "client disconnect".to_string())));
    assert_eq!(
        wait_for_status(&mut connection, "disconnected").await["reason"],
        "client disconnect"
    );
    assert_eq!(client.state().await.state, ConnectionState::Disconnected);
}
