//! Server reply parsing and dispatch

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::SessionError;

/// What the recognizer understood, in the shape of the example's answer type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StudentAnswer {
    Number(f64),
    Fraction { numerator: f64, denominator: f64 },
    /// One value per variable, in example order
    Values(Vec<f64>),
    Text(String),
}

impl fmt::Display for StudentAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentAnswer::Number(n) => write!(f, "{}", n),
            StudentAnswer::Fraction { numerator, denominator } => write!(f, "{}/{}", numerator, denominator),
            StudentAnswer::Values(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            StudentAnswer::Text(text) => f.write_str(text),
        }
    }
}

/// Outcome of one spoken answer, as judged by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_correct: bool,
    /// Whether the practice should move on to the next example
    pub continue_with_next: bool,
    /// `None` when nothing usable was recognized
    pub student_answer: Option<StudentAnswer>,
}

/// A server message after dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum ServerReply {
    /// The student asked to skip the current example
    Skipped,
    /// The student asked to end the practice
    Finished,
    Evaluated(Evaluation),
    /// Survey transcription of one recognized utterance
    Transcription(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawServerMessage {
    #[serde(default)]
    skipped: Option<bool>,
    #[serde(default)]
    finished: Option<bool>,
    #[serde(default, rename = "isCorrect")]
    is_correct: Option<bool>,
    #[serde(default)]
    continue_with_next: Option<bool>,
    /// Kept raw so an explicit `null` differs from a missing key
    #[serde(default, deserialize_with = "present")]
    student_answer: Option<Value>,
    #[serde(default)]
    transcription: Option<String>,
}

/// `Some` whenever the key is present, `null` included
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl RawServerMessage {
    fn has_evaluation_fields(&self) -> bool {
        self.is_correct.is_some() || self.continue_with_next.is_some() || self.student_answer.is_some()
    }
}

/// Parse one text message from the server
///
/// First match wins: `skipped`, then `finished`, then a bare
/// `transcription`, then an evaluation result. Anything that is not a JSON
/// object or lacks evaluation fields is a protocol error.
pub fn parse_server_message(text: &str) -> Result<ServerReply, SessionError> {
    let raw: RawServerMessage =
        serde_json::from_str(text).map_err(|e| SessionError::Protocol(format!("{}: {}", e, text)))?;

    if raw.skipped == Some(true) {
        return Ok(ServerReply::Skipped);
    }

    if raw.finished == Some(true) {
        return Ok(ServerReply::Finished);
    }

    if !raw.has_evaluation_fields() {
        if let Some(text) = raw.transcription {
            return Ok(ServerReply::Transcription(text));
        }
    }

    let missing = |field: &str| SessionError::Protocol(format!("evaluation result missing `{}`: {}", field, text));

    Ok(ServerReply::Evaluated(Evaluation {
        is_correct: raw.is_correct.ok_or_else(|| missing("isCorrect"))?,
        continue_with_next: raw.continue_with_next.ok_or_else(|| missing("continue_with_next"))?,
        student_answer: parse_student_answer(raw.student_answer.ok_or_else(|| missing("student_answer"))?, text)?,
    }))
}

fn parse_student_answer(value: Value, text: &str) -> Result<Option<StudentAnswer>, SessionError> {
    serde_json::from_value(value)
        .map_err(|e| SessionError::Protocol(format!("unrecognized `student_answer` ({}): {}", e, text)))
}
