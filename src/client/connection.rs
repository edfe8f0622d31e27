use crate::types::{Envelope, Result, WS_CLOSE_NORMAL};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
/// A write half tagged with the session it was opened for
pub type SessionWriter = (u64, WsWriter);

/// Owns the write half of the live socket.
///
/// The writer is tagged with the session number it was opened for, so tasks belonging to
/// an older session (a heartbeat that outlived its socket, say) can tell they are stale.
pub struct ConnectionManager {
    ws_write: Mutex<Option<SessionWriter>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            ws_write: Mutex::new(None),
        }
    }

    /// Installs the write half for `session` (called after a successful handshake)
    pub async fn set_writer(&self, session: u64, writer: WsWriter) {
        let mut ws = self.ws_write.lock().await;
        *ws = Some((session, writer));
    }

    /// Sends an envelope through the current writer
    ///
    /// Returns `Ok(false)` when there is no writer to send on.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<bool> {
        let json = serde_json::to_string(envelope)?;

        let mut ws_guard = self.ws_write.lock().await;
        let Some((_, ws)) = ws_guard.as_mut() else {
            return Ok(false);
        };
        ws.send(Message::Text(json.into())).await?;
        Ok(true)
    }

    /// Sends an envelope only if the writer still belongs to `session`
    pub async fn send_for(&self, session: u64, envelope: &Envelope) -> Result<bool> {
        let json = serde_json::to_string(envelope)?;

        let mut ws_guard = self.ws_write.lock().await;
        match ws_guard.as_mut() {
            Some((current, ws)) if *current == session => {
                ws.send(Message::Text(json.into())).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Detaches the writer so it can be closed without holding any client lock
    pub async fn take_writer(&self) -> Option<SessionWriter> {
        self.ws_write.lock().await.take()
    }

    /// Closes a detached writer gracefully
    ///
    /// Close errors are logged only; the writer is gone either way.
    pub async fn close_writer((session, mut ws): SessionWriter) {
        let frame = CloseFrame {
            code: CloseCode::from(WS_CLOSE_NORMAL),
            reason: "client disconnect".into(),
        };
        if let Err(e) = ws.send(Message::Close(Some(frame))).await {
            tracing::debug!(session, "Close frame not delivered: {}", e);
        }
        if let Err(e) = ws.close().await {
            tracing::debug!(session, "Socket close failed: {}", e);
        }
    }

    /// Drops the writer without a close handshake (the socket is already gone)
    pub async fn clear_writer(&self) {
        let mut ws = self.ws_write.lock().await;
        *ws = None;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
