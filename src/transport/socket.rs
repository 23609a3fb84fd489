use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::audio::PcmFrame;
use crate::error::SessionError;
use crate::protocol::SessionKind;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read half of a session socket
pub type SocketSource = SplitStream<WsStream>;

/// Full URL of the speech endpoint for a session kind
pub fn endpoint_url(ws_base_url: &str, kind: SessionKind) -> String {
    format!("{}/{}", ws_base_url.trim_end_matches('/'), kind.endpoint_path())
}

/// Open the socket and wait for the handshake
pub async fn connect(url: &str, timeout: Duration) -> Result<(SocketSink, SocketSource), SessionError> {
    info!("Connecting to {}", url);

    let connect_error = |reason: String| SessionError::Connect {
        url: url.to_string(),
        reason,
    };

    let (stream, _response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| connect_error(format!("timed out after {:?}", timeout)))?
        .map_err(|e| connect_error(e.to_string()))?;

    info!("Connected to {}", url);

    let (sink, source) = stream.split();
    Ok((
        SocketSink {
            sink,
            url: url.to_string(),
        },
        source,
    ))
}

/// Write half of a session socket
pub struct SocketSink {
    sink: SplitSink<WsStream, Message>,
    url: String,
}

impl SocketSink {
    /// Send one JSON text message
    pub async fn send_json<T: Serialize>(&mut self, message: &T) -> Result<(), SessionError> {
        let text = serde_json::to_string(message)?;
        self.send_text(text).await
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        debug!("-> {}", text);
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Send one frame as a binary message; returns the byte count
    pub async fn send_frame(&mut self, frame: &PcmFrame) -> Result<usize, SessionError> {
        let bytes = frame.to_le_bytes();
        let len = bytes.len();
        self.sink.send(Message::Binary(bytes)).await?;
        Ok(len)
    }

    /// Send a close frame and flush
    pub async fn close(&mut self) -> Result<(), SessionError> {
        info!("Closing socket {}", self.url);
        self.sink.close().await?;
        Ok(())
    }
}
