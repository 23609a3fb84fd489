//! Speech-answer WebSocket protocol
//!
//! Outbound: session metadata, then a language directive, then binary PCM
//! frames. Inbound: JSON replies dispatched into [`ServerReply`].

pub mod inbound;
pub mod messages;

pub use inbound::{parse_server_message, Evaluation, ServerReply, StudentAnswer};
pub use messages::{
    AnswerMetadata, AudioFormat, LanguageDirective, QuestionType, SessionKind, SessionMetadata,
    SurveyMetadata,
};
