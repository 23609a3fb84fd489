use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::state::SessionState;
use crate::protocol::{Evaluation, SessionKind};

/// Statistics about a speech session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// ID of the current (or last) session, if any was started
    pub session_id: Option<String>,

    /// Endpoint kind of the current (or last) session
    pub kind: Option<SessionKind>,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since start
    pub duration_secs: f64,

    /// Audio frames written to the socket
    pub frames_sent: u64,

    /// Audio bytes written to the socket
    pub bytes_sent: u64,

    /// Frames that arrived after the socket left `Open` and were dropped
    pub frames_discarded: u64,

    /// Server messages received (including malformed ones)
    pub messages_received: u64,

    /// Most recent evaluation result
    pub last_evaluation: Option<Evaluation>,
}

/// Counters shared between the session tasks
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub frames_discarded: AtomicU64,
    pub messages_received: AtomicU64,
}

impl SessionCounters {
    pub fn record_frame(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.frames_sent.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.frames_discarded.load(Ordering::Relaxed),
            self.messages_received.load(Ordering::Relaxed),
        )
    }
}

/// A survey transcription segment kept for `SpeechSession::transcript`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
