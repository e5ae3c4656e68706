//! WebSocket Transport Layer
//!
//! Single responsibility: Connect to a WebSocket and send/receive text frames.
//! No knowledge of envelopes, registration, or reconnection.

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{error::ProtocolError, http::Request, protocol::Message, Error as WsError},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::error::StpError;

/// Type alias for the WebSocket send half
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Type alias for the WebSocket receive half
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// What the reader saw when pulling the next frame.
#[derive(Debug)]
pub enum Inbound {
    /// A text frame (binary frames carrying UTF-8 are converted)
    Text(String),
    /// The peer closed the connection or the stream ended
    Closed,
    /// The socket failed
    Failed(String),
}

/// A connected WebSocket transport.
///
/// Only constructed via `Transport::connect()`.
pub struct Transport {
    sink: WsSink,
    stream: WsStream,
}

impl Transport {
    /// Connect to a WebSocket endpoint.
    ///
    /// Returns a Transport only when the handshake has completed.
    pub async fn connect(url: &str) -> Result<Self, StpError> {
        debug!(url = %url, "Connecting to WebSocket");

        let request = Request::builder()
            .uri(url)
            .header("Host", extract_host(url))
            .header("Origin", "http://localhost")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| StpError::ConnectFailed(format!("Failed to build request: {}", e)))?;

        let (ws, _) = connect_async_with_config(request, None, false)
            .await
            .map_err(|e| StpError::ConnectFailed(format!("WebSocket connect failed: {}", e)))?;

        let (sink, stream) = ws.split();

        debug!(url = %url, "WebSocket connected");
        Ok(Self { sink, stream })
    }

    /// Split into separate sink and stream for concurrent send/receive.
    pub fn split(self) -> (WsSink, WsStream) {
        (self.sink, self.stream)
    }
}

/// Send one text frame.
pub async fn send_text(sink: &mut WsSink, text: String) -> Result<(), StpError> {
    sink.send(Message::Text(text))
        .await
        .map_err(|e| StpError::Transport(format!("Failed to send: {}", e)))
}

/// Close the send half, telling the peer we are going away.
pub async fn close(sink: &mut WsSink) -> Result<(), StpError> {
    sink.close()
        .await
        .map_err(|e| StpError::Transport(format!("Failed to close: {}", e)))
}

/// Receive the next text frame.
///
/// Ping/pong is answered by tungstenite; other control frames are skipped.
pub async fn recv_text(stream: &mut WsStream) -> Inbound {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Inbound::Text(text),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => return Inbound::Text(text),
                Err(_) => {
                    debug!("Skipping non-UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "Peer closed connection");
                return Inbound::Closed;
            }
            Some(Ok(_)) => continue,
            // Peer went away without the closing handshake; still a close, not a fault.
            Some(Err(WsError::ConnectionClosed))
            | Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) => {
                debug!("Peer dropped connection without closing handshake");
                return Inbound::Closed;
            }
            Some(Err(e)) => return Inbound::Failed(format!("WebSocket error: {}", e)),
            None => return Inbound::Closed,
        }
    }
}

/// Extract host from URL for Host header
fn extract_host(url: &str) -> &str {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("localhost")
}
