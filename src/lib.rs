pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod language;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioDump, AudioSource, PcmFrame, WavClip,
};
pub use config::Config;
pub use error::{CaptureError, SessionError};
pub use http::{create_router, AppState};
pub use language::Language;
pub use protocol::{AnswerMetadata, Evaluation, SessionKind, SessionMetadata, StudentAnswer, SurveyMetadata};
pub use session::{
    CloseReason, SessionConfig, SessionEvent, SessionState, SessionStats, SpeechSession,
    TranscriptSegment,
};
