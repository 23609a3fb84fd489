//! Speech session management
//!
//! This module provides the `SpeechSession` controller that manages:
//! - The WebSocket connection to the answer or survey endpoint
//! - Sending metadata and the language directive, then streaming audio
//! - Dispatching server replies as `SessionEvent`s
//! - Releasing audio capture when the session ends for any reason

mod config;
mod event;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use event::{CloseReason, ErrorKind, SessionEvent};
pub use session::SpeechSession;
pub use state::SessionState;
pub use stats::{SessionStats, TranscriptSegment};
