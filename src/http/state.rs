use crate::audio::{AudioBackendConfig, AudioSource};
use crate::session::{SessionConfig, SessionEvent, SpeechSession};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single session slot
    pub session: Arc<Mutex<SpeechSession>>,

    /// Events of the current (or last) session, oldest first
    pub events: Arc<RwLock<Vec<SessionEvent>>>,

    /// Task copying session events into `events`
    collector: Arc<Mutex<Option<JoinHandle<()>>>>,

    /// Where new sessions take their audio from
    pub source: AudioSource,

    pub backend_config: AudioBackendConfig,
}

impl AppState {
    pub fn new(
        session_config: SessionConfig,
        source: AudioSource,
        backend_config: AudioBackendConfig,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(SpeechSession::new(session_config))),
            events: Arc::new(RwLock::new(Vec::new())),
            collector: Arc::new(Mutex::new(None)),
            source,
            backend_config,
        }
    }

    /// Start recording the events of a freshly started session
    pub async fn collect_events(&self, mut events_rx: mpsc::UnboundedReceiver<SessionEvent>) {
        let mut collector = self.collector.lock().await;
        if let Some(previous) = collector.take() {
            previous.abort();
        }

        self.events.write().await.clear();

        let events = Arc::clone(&self.events);
        *collector = Some(tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                events.write().await.push(event);
            }
        }));
    }
}
