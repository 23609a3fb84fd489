use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Audio encoding announced in session metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioFormat {
    #[default]
    #[serde(rename = "pcm")]
    Pcm,
}

/// Question type announced for survey sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuestionType {
    #[default]
    #[serde(rename = "open-question")]
    OpenQuestion,
}

/// Which speech endpoint a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Spoken answer to a drill example, evaluated by the server
    Answer,
    /// Spoken answer to an open survey question, transcribed by the server
    Survey,
}

impl SessionKind {
    /// Endpoint path below the WebSocket base URL
    pub fn endpoint_path(self) -> &'static str {
        match self {
            SessionKind::Answer => "speech/",
            SessionKind::Survey => "survey/",
        }
    }
}

/// Metadata for an answer session (first message on /speech/)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub student_id: i64,
    pub example_id: i64,
    /// Timestamp of the practice record this answer belongs to
    pub record_date: String,
    /// Answer input type of the example (e.g. "INLINE", "FRAC", "VAR")
    pub input_type: String,
    #[serde(default)]
    pub format: AudioFormat,
}

impl AnswerMetadata {
    pub fn new(
        student_id: i64,
        example_id: i64,
        record_date: impl Into<String>,
        input_type: impl Into<String>,
    ) -> Self {
        Self {
            student_id,
            example_id,
            record_date: record_date.into(),
            input_type: input_type.into(),
            format: AudioFormat::Pcm,
        }
    }
}

/// Metadata for a survey session (first message on /survey/)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyMetadata {
    pub question_text: String,
    #[serde(default)]
    pub question_type: QuestionType,
    /// Skill IDs the question is about
    pub skills: Vec<i64>,
    #[serde(default)]
    pub format: AudioFormat,
}

impl SurveyMetadata {
    pub fn new(question_text: impl Into<String>, skills: Vec<i64>) -> Self {
        Self {
            question_text: question_text.into(),
            question_type: QuestionType::OpenQuestion,
            skills,
            format: AudioFormat::Pcm,
        }
    }
}

/// Session metadata, sent exactly once as the first message of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SessionMetadata {
    Answer(AnswerMetadata),
    Survey(SurveyMetadata),
}

impl SessionMetadata {
    pub fn kind(&self) -> SessionKind {
        match self {
            SessionMetadata::Answer(_) => SessionKind::Answer,
            SessionMetadata::Survey(_) => SessionKind::Survey,
        }
    }
}

impl From<AnswerMetadata> for SessionMetadata {
    fn from(metadata: AnswerMetadata) -> Self {
        SessionMetadata::Answer(metadata)
    }
}

impl From<SurveyMetadata> for SessionMetadata {
    fn from(metadata: SurveyMetadata) -> Self {
        SessionMetadata::Survey(metadata)
    }
}

/// Recognizer language, sent right after the metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDirective {
    pub language: String,
}

impl From<Language> for LanguageDirective {
    fn from(language: Language) -> Self {
        Self {
            language: language.locale_tag().to_string(),
        }
    }
}
