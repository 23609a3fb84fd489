//! Error types for capture and speech sessions

use thiserror::Error;

use crate::protocol::SessionKind;

/// Audio capture errors
///
/// All of these are terminal for the session that hit them; nothing retries.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No default input device available")]
    NoInputDevice,

    #[error("Input device not found: {0}")]
    DeviceNotFound(String),

    #[error("Unsupported input config: {0}")]
    UnsupportedConfig(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Audio file error: {0}")]
    File(String),

    #[error("Resampler error: {0}")]
    Resampler(String),

    #[error("Already capturing")]
    AlreadyCapturing,
}

/// Speech session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed server message: {0}")]
    Protocol(String),

    #[error("Session is not open")]
    Closed,

    #[error("Cannot send {requested:?} metadata to a {active:?} session")]
    KindMismatch {
        active: SessionKind,
        requested: SessionKind,
    },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}
