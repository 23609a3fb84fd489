// Shared helpers for integration tests: a loopback speech server and a
// scripted audio backend.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use voice_drill::audio::{AudioBackend, PcmFrame};
use voice_drill::{CaptureError, SessionConfig, SessionEvent};

const WAIT: Duration = Duration::from_secs(5);

/// What the loopback server saw from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Handshake on this request path
    Connected(String),
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

enum Command {
    Reply(String),
    Close,
    /// Drop the TCP stream without a closing handshake
    Abort,
}

/// WebSocket server on 127.0.0.1 that records every client message
///
/// Connections are served one at a time, in order.
pub struct LoopbackServer {
    pub addr: SocketAddr,
    received_rx: mpsc::UnboundedReceiver<Received>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl LoopbackServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                serve_connection(stream, &received_tx, &mut command_rx).await;
            }
        });

        Self {
            addr,
            received_rx,
            command_tx,
        }
    }

    /// Base URL to put in `SessionConfig::ws_base_url`
    pub fn base_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ws_base_url: self.base_url(),
            connect_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        }
    }

    /// Send a text message to the connected client
    pub fn reply(&self, text: &str) {
        self.command_tx.send(Command::Reply(text.to_string())).unwrap();
    }

    /// Close the connection from the server side
    pub fn close_peer(&self) {
        self.command_tx.send(Command::Close).unwrap();
    }

    /// Kill the connection as a network failure would
    pub fn abort_peer(&self) {
        self.command_tx.send(Command::Abort).unwrap();
    }

    pub async fn next(&mut self) -> Received {
        tokio::time::timeout(WAIT, self.received_rx.recv())
            .await
            .expect("timed out waiting for the client")
            .expect("server stopped")
    }

    /// Next text message, skipping audio frames
    pub async fn next_text(&mut self) -> String {
        loop {
            match self.next().await {
                Received::Text(text) => return text,
                Received::Binary(_) => continue,
                other => panic!("expected a text message, got {:?}", other),
            }
        }
    }

    /// Skip everything up to the end of the current connection
    pub async fn wait_closed(&mut self) {
        while self.next().await != Received::Closed {}
    }
}

async fn serve_connection(
    stream: TcpStream,
    received_tx: &mpsc::UnboundedSender<Received>,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
) {
    let handshake_tx = received_tx.clone();
    let callback = move |req: &Request, resp: Response| {
        let _ = handshake_tx.send(Received::Connected(req.uri().path().to_string()));
        Ok::<Response, ErrorResponse>(resp)
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = received_tx.send(Received::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = received_tx.send(Received::Binary(data));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    let _ = received_tx.send(Received::Closed);
                    break;
                }
                Some(Ok(_)) => {}
            },
            command = command_rx.recv() => match command {
                Some(Command::Reply(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Some(Command::Close) => {
                    let _ = write.send(Message::Close(None)).await;
                }
                Some(Command::Abort) => {
                    let _ = received_tx.send(Received::Closed);
                    break;
                }
                None => break,
            },
        }
    }
}

/// A full 4096-sample frame whose first sample is `first`
pub fn frame(sequence: u64, first: i16) -> PcmFrame {
    frame_at(sequence, first, 16000)
}

pub fn frame_at(sequence: u64, first: i16, sample_rate: u32) -> PcmFrame {
    let mut samples = vec![0i16; 4096];
    samples[0] = first;
    PcmFrame {
        samples,
        sample_rate,
        sequence,
        timestamp_ms: sequence * 4096 * 1000 / sample_rate as u64,
    }
}

/// Audio backend that emits a fixed list of frames and keeps the channel
/// open until stopped
pub struct ScriptedBackend {
    frames: Vec<PcmFrame>,
    /// Emitted while stopping, like callbacks still in flight on the audio thread
    late_frames: usize,
    deny_permission: bool,
    tx: Option<mpsc::Sender<PcmFrame>>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(frames: Vec<PcmFrame>) -> Self {
        Self {
            frames,
            late_frames: 0,
            deny_permission: false,
            tx: None,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    /// Fails `start()` the way a denied microphone prompt does
    pub fn denied() -> Self {
        Self {
            deny_permission: true,
            ..Self::silent()
        }
    }

    /// Push `count` more frames into the channel when stopped
    pub fn with_late_frames(mut self, count: usize) -> Self {
        self.late_frames = count;
        self
    }

    /// Number of times a running capture was released
    pub fn releases(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

#[async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<PcmFrame>, CaptureError> {
        if self.deny_permission {
            return Err(CaptureError::PermissionDenied("user declined".to_string()));
        }
        if self.tx.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let (tx, rx) = mpsc::channel((self.frames.len() + self.late_frames).max(1));
        for frame in self.frames.drain(..) {
            tx.try_send(frame).unwrap();
        }
        self.tx = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(tx) = self.tx.take() {
            for sequence in 0..self.late_frames {
                let _ = tx.try_send(frame(1000 + sequence as u64, 1));
            }
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Next session event, failing the test after a few seconds
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

/// Poll until `counter` reaches `expected`
pub async fn wait_for_count(counter: &AtomicUsize, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while counter.load(Ordering::SeqCst) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("counter never reached the expected value");
}
