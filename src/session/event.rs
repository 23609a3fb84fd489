use serde::Serialize;

use crate::protocol::{Evaluation, ServerReply};

/// Why a session reached `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// `stop()` was called (or a new session replaced this one)
    Stopped,
    /// The server closed the connection
    Remote,
    /// Reading or writing the socket failed
    TransportError,
}

/// Category of an asynchronous session failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A server message could not be parsed; it was discarded
    Protocol,
    /// The socket failed; the session is closing
    Transport,
}

/// Everything a caller can observe about a running session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Metadata and language directive were sent; audio is streaming
    Opened { session_id: String, endpoint: String },
    Skipped,
    Finished,
    AnswerEvaluated(Evaluation),
    Transcription { text: String },
    Error { kind: ErrorKind, message: String },
    Closed { reason: CloseReason },
}

impl From<ServerReply> for SessionEvent {
    fn from(reply: ServerReply) -> Self {
        match reply {
            ServerReply::Skipped => SessionEvent::Skipped,
            ServerReply::Finished => SessionEvent::Finished,
            ServerReply::Evaluated(evaluation) => SessionEvent::AnswerEvaluated(evaluation),
            ServerReply::Transcription(text) => SessionEvent::Transcription { text },
        }
    }
}
