use std::path::PathBuf;
use std::time::Duration;

use crate::language::Language;

/// Configuration for speech sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the speech endpoints (e.g. "ws://localhost:8000/ws")
    pub ws_base_url: String,

    /// How long to wait for the WebSocket handshake
    pub connect_timeout: Duration,

    /// Initial UI language (selects the recognizer locale)
    pub language: Language,

    /// Directory for WAV dumps of sent audio, `None` to disable
    pub dump_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            language: Language::Cs,
            dump_dir: None,
        }
    }
}
