use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::event::{CloseReason, ErrorKind, SessionEvent};
use super::state::{SessionState, StateCell};
use super::stats::{SessionCounters, SessionStats, TranscriptSegment};
use crate::audio::{AudioBackend, AudioDump, PcmFrame};
use crate::error::SessionError;
use crate::language::Language;
use crate::protocol::{parse_server_message, Evaluation, LanguageDirective, ServerReply, SessionKind, SessionMetadata};
use crate::transport::{self, SocketSink, SocketSource};

/// How long `stop()` waits for the writer to release capture and close the socket
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands for the writer task
enum Outbound {
    Text(String),
    Close,
}

/// Handles of the connection currently owned by the controller
struct ActiveSession {
    session_id: String,
    kind: SessionKind,
    state: Arc<StateCell>,
    control_tx: mpsc::UnboundedSender<Outbound>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

/// Speech answer session controller
///
/// Owns at most one connection at a time. `start()` connects to the
/// endpoint for the metadata's kind, sends the metadata and the language
/// directive, then streams PCM frames from the audio backend until the
/// session is stopped or the server closes it. Server replies are delivered
/// on the returned event channel.
pub struct SpeechSession {
    config: SessionConfig,
    language: Language,
    state: Arc<StateCell>,
    active: Option<ActiveSession>,
    session_id: Option<String>,
    kind: Option<SessionKind>,
    started_at: Option<DateTime<Utc>>,
    counters: Arc<SessionCounters>,
    last_evaluation: Arc<Mutex<Option<Evaluation>>>,
    transcript: Arc<Mutex<Vec<TranscriptSegment>>>,
}

impl SpeechSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            language: config.language,
            config,
            state: Arc::new(StateCell::new(SessionState::Idle)),
            active: None,
            session_id: None,
            kind: None,
            started_at: None,
            counters: Arc::new(SessionCounters::default()),
            last_evaluation: Arc::new(Mutex::new(None)),
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Open a session and start streaming audio from `backend`
    ///
    /// A session that is still running is stopped first. On error nothing
    /// is left running: the socket is closed and the backend released.
    pub async fn start(
        &mut self,
        metadata: impl Into<SessionMetadata>,
        mut backend: Box<dyn AudioBackend>,
    ) -> Result<mpsc::UnboundedReceiver<SessionEvent>, SessionError> {
        let metadata = metadata.into();

        if let Some(active) = &self.active {
            warn!("Replacing session {}", active.session_id);
            self.stop().await;
        }

        let kind = metadata.kind();
        let session_id = Uuid::new_v4().to_string();
        let state = Arc::new(StateCell::new(SessionState::Connecting));

        self.state = Arc::clone(&state);
        self.session_id = Some(session_id.clone());
        self.kind = Some(kind);
        self.started_at = Some(Utc::now());
        self.counters = Arc::new(SessionCounters::default());
        *self.last_evaluation.lock().await = None;
        self.transcript.lock().await.clear();

        let url = transport::endpoint_url(&self.config.ws_base_url, kind);
        info!("Starting {:?} session {} on {}", kind, session_id, url);

        let (mut sink, source) = match transport::connect(&url, self.config.connect_timeout).await {
            Ok(halves) => halves,
            Err(e) => {
                error!("Session {} failed to connect: {}", session_id, e);
                state.close();
                return Err(e);
            }
        };

        state.set(SessionState::Open);

        if let Err(e) = send_preamble(&mut sink, &metadata, self.language).await {
            error!("Session {} failed to send metadata: {}", session_id, e);
            state.close();
            return Err(e);
        }

        let frames = match backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Session {} failed to start capture: {}", session_id, e);
                state.close();
                if let Err(stop_err) = backend.stop().await {
                    debug!("Releasing failed backend: {}", stop_err);
                }
                if let Err(close_err) = sink.close().await {
                    debug!("Closing socket after capture failure: {}", close_err);
                }
                return Err(e.into());
            }
        };

        info!("Session {} capturing from {}", session_id, backend.name());

        let dump_target = self.dump_target(&metadata);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let _ = events_tx.send(SessionEvent::Opened {
            session_id: session_id.clone(),
            endpoint: url,
        });

        let writer = tokio::spawn(
            Writer {
                sink,
                frames,
                control_rx,
                backend,
                dump_target,
                dump: None,
                state: Arc::clone(&state),
                counters: Arc::clone(&self.counters),
                events_tx: events_tx.clone(),
            }
            .run(),
        );

        let reader = tokio::spawn(
            Reader {
                source,
                state: Arc::clone(&state),
                counters: Arc::clone(&self.counters),
                last_evaluation: Arc::clone(&self.last_evaluation),
                transcript: Arc::clone(&self.transcript),
                events_tx: events_tx.clone(),
                control_tx: control_tx.clone(),
            }
            .run(),
        );

        self.active = Some(ActiveSession {
            session_id,
            kind,
            state,
            control_tx,
            events_tx,
            writer: Some(writer),
            reader: Some(reader),
        });

        Ok(events_rx)
    }

    /// Stop the session: release audio capture, then close the socket
    ///
    /// Safe to call at any time; a second call is a no-op.
    pub async fn stop(&mut self) -> SessionStats {
        let Some(mut active) = self.active.take() else {
            debug!("No session to stop");
            return self.stats().await;
        };

        info!("Stopping session {}", active.session_id);

        let first_close = active.state.close();
        let _ = active.control_tx.send(Outbound::Close);

        if let Some(writer) = active.writer.take() {
            let abort = writer.abort_handle();
            match tokio::time::timeout(STOP_TIMEOUT, writer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Writer task failed: {}", e),
                Err(_) => {
                    warn!("Writer did not finish within {:?}, aborting", STOP_TIMEOUT);
                    abort.abort();
                }
            }
        }

        if let Some(reader) = active.reader.take() {
            reader.abort();
        }

        if first_close {
            let _ = active.events_tx.send(SessionEvent::Closed {
                reason: CloseReason::Stopped,
            });
        }

        info!("Session {} stopped", active.session_id);
        self.stats().await
    }

    /// Send updated metadata over the open session (e.g. the next example)
    pub fn update_metadata(&mut self, metadata: impl Into<SessionMetadata>) -> Result<(), SessionError> {
        let metadata = metadata.into();
        let active = self.open_session().ok_or(SessionError::Closed)?;

        if metadata.kind() != active.kind {
            return Err(SessionError::KindMismatch {
                active: active.kind,
                requested: metadata.kind(),
            });
        }

        let text = serde_json::to_string(&metadata)?;
        active
            .control_tx
            .send(Outbound::Text(text))
            .map_err(|_| SessionError::Closed)
    }

    /// Switch the recognizer language
    ///
    /// The language is kept for future sessions; an open session also gets
    /// a new directive right away.
    pub fn change_language(&mut self, language: Language) -> Result<(), SessionError> {
        self.language = language;

        let Some(active) = self.open_session() else {
            debug!("Language set to {} for the next session", language);
            return Ok(());
        };

        info!("Switching session {} to {}", active.session_id, language);
        let text = serde_json::to_string(&LanguageDirective::from(language))?;
        active
            .control_tx
            .send(Outbound::Text(text))
            .map_err(|_| SessionError::Closed)
    }

    /// Flip between the two supported languages
    pub fn toggle_language(&mut self) -> Result<Language, SessionError> {
        let language = self.language.toggle();
        self.change_language(language)?;
        Ok(language)
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub async fn last_evaluation(&self) -> Option<Evaluation> {
        self.last_evaluation.lock().await.clone()
    }

    /// Transcription segments received during the current (or last) survey
    pub async fn transcript(&self) -> Vec<TranscriptSegment> {
        self.transcript.lock().await.clone()
    }

    pub async fn stats(&self) -> SessionStats {
        let (frames_sent, bytes_sent, frames_discarded, messages_received) = self.counters.snapshot();
        let duration_secs = self
            .started_at
            .map(|started| Utc::now().signed_duration_since(started).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            state: self.state.get(),
            session_id: self.session_id.clone(),
            kind: self.kind,
            started_at: self.started_at,
            duration_secs,
            frames_sent,
            bytes_sent,
            frames_discarded,
            messages_received,
            last_evaluation: self.last_evaluation().await,
        }
    }

    fn open_session(&self) -> Option<&ActiveSession> {
        self.active
            .as_ref()
            .filter(|active| active.state.get() == SessionState::Open)
    }

    fn dump_target(&self, metadata: &SessionMetadata) -> Option<DumpTarget> {
        let dir = self.config.dump_dir.clone()?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let stem = match metadata {
            SessionMetadata::Answer(answer) => {
                format!("{}_{}_{}", answer.student_id, answer.example_id, timestamp)
            }
            SessionMetadata::Survey(_) => format!("survey_{}", timestamp),
        };

        Some(DumpTarget { dir, stem })
    }
}

/// Where a session's audio dump goes; the file is created once the first
/// sent frame tells its sample rate
struct DumpTarget {
    dir: PathBuf,
    stem: String,
}

impl DumpTarget {
    fn create(self, sample_rate: u32) -> Option<AudioDump> {
        match AudioDump::create(&self.dir, &self.stem, sample_rate) {
            Ok(dump) => Some(dump),
            Err(e) => {
                warn!("Audio dump disabled for this session: {}", e);
                None
            }
        }
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.state.close();
            // Dropping the writer's backend stops capture
            if let Some(writer) = active.writer.take() {
                writer.abort();
            }
            if let Some(reader) = active.reader.take() {
                reader.abort();
            }
        }
    }
}

async fn send_preamble(
    sink: &mut SocketSink,
    metadata: &SessionMetadata,
    language: Language,
) -> Result<(), SessionError> {
    sink.send_json(metadata).await?;
    sink.send_json(&LanguageDirective::from(language)).await?;
    Ok(())
}

/// Sends control messages and audio frames, and owns the audio backend
struct Writer {
    sink: SocketSink,
    frames: mpsc::Receiver<PcmFrame>,
    control_rx: mpsc::UnboundedReceiver<Outbound>,
    backend: Box<dyn AudioBackend>,
    dump_target: Option<DumpTarget>,
    dump: Option<AudioDump>,
    state: Arc<StateCell>,
    counters: Arc<SessionCounters>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Writer {
    async fn run(mut self) {
        let mut frames_done = false;
        let mut socket_failed = false;

        loop {
            tokio::select! {
                biased;

                command = self.control_rx.recv() => match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = self.sink.send_text(text).await {
                            self.fail(e);
                            socket_failed = true;
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => break,
                },

                frame = self.frames.recv(), if !frames_done => match frame {
                    Some(frame) => {
                        if let Err(e) = self.send_frame(frame).await {
                            self.fail(e);
                            socket_failed = true;
                            break;
                        }
                    }
                    None => {
                        info!("Audio source ended");
                        frames_done = true;
                    }
                },
            }
        }

        // Capture is released before the socket goes away
        if let Err(e) = self.backend.stop().await {
            error!("Failed to stop audio backend: {}", e);
        }

        // Frames still queued from the capture thread are never sent
        let mut late = 0;
        while self.frames.try_recv().is_ok() {
            late += 1;
        }
        if late > 0 {
            debug!("Discarding {} frames queued at teardown", late);
            self.counters.frames_discarded.fetch_add(late, Ordering::Relaxed);
        }

        if let Some(dump) = self.dump.take() {
            if let Err(e) = dump.finish() {
                warn!("Failed to finish audio dump: {}", e);
            }
        }

        if !socket_failed {
            if let Err(e) = self.sink.close().await {
                debug!("Socket close: {}", e);
            }
        }
    }

    async fn send_frame(&mut self, frame: PcmFrame) -> Result<(), SessionError> {
        if self.state.get() != SessionState::Open {
            self.counters.frames_discarded.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let bytes = self.sink.send_frame(&frame).await?;
        self.counters.record_frame(bytes);

        if let Some(target) = self.dump_target.take() {
            self.dump = target.create(frame.sample_rate);
        }

        if let Some(dump) = &mut self.dump {
            if let Err(e) = dump.write_frame(&frame) {
                warn!("Audio dump stopped: {}", e);
                self.dump = None;
            }
        }

        Ok(())
    }

    /// Close on a write failure; silent if the session already closed
    fn fail(&self, e: SessionError) {
        error!("Socket write failed: {}", e);
        if self.state.close() {
            let _ = self.events_tx.send(SessionEvent::Error {
                kind: ErrorKind::Transport,
                message: e.to_string(),
            });
            let _ = self.events_tx.send(SessionEvent::Closed {
                reason: CloseReason::TransportError,
            });
        }
    }
}

/// Reads server replies and turns them into session events
struct Reader {
    source: SocketSource,
    state: Arc<StateCell>,
    counters: Arc<SessionCounters>,
    last_evaluation: Arc<Mutex<Option<Evaluation>>>,
    transcript: Arc<Mutex<Vec<TranscriptSegment>>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    control_tx: mpsc::UnboundedSender<Outbound>,
}

impl Reader {
    async fn run(mut self) {
        let reason = loop {
            match self.source.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.counters.messages_received.fetch_add(1, Ordering::Relaxed);
                    self.dispatch(&text).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Ignoring {} byte binary message", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the session: {:?}", frame);
                    break CloseReason::Remote;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Socket read failed: {}", e);
                    if self.is_open() {
                        let _ = self.events_tx.send(SessionEvent::Error {
                            kind: ErrorKind::Transport,
                            message: e.to_string(),
                        });
                    }
                    break CloseReason::TransportError;
                }
                None => break CloseReason::Remote,
            }
        };

        if self.state.close() {
            let _ = self.events_tx.send(SessionEvent::Closed { reason });
        }

        // Releases the microphone
        let _ = self.control_tx.send(Outbound::Close);
    }

    /// Nothing follows `Closed` on the event channel
    fn is_open(&self) -> bool {
        self.state.get() == SessionState::Open
    }

    async fn dispatch(&self, text: &str) {
        if !self.is_open() {
            debug!("Dropping reply received after close: {}", text);
            return;
        }

        let reply = match parse_server_message(text) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Discarding server message: {}", e);
                let _ = self.events_tx.send(SessionEvent::Error {
                    kind: ErrorKind::Protocol,
                    message: e.to_string(),
                });
                return;
            }
        };

        debug!("<- {:?}", reply);

        match &reply {
            ServerReply::Evaluated(evaluation) => {
                *self.last_evaluation.lock().await = Some(evaluation.clone());
            }
            ServerReply::Transcription(text) => {
                self.transcript.lock().await.push(TranscriptSegment {
                    text: text.clone(),
                    timestamp: Utc::now(),
                });
            }
            ServerReply::Skipped | ServerReply::Finished => {}
        }

        let _ = self.events_tx.send(reply.into());
    }
}
