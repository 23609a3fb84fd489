use voice_drill::audio::PcmFrame;
use voice_drill::protocol::{
    parse_server_message, AnswerMetadata, LanguageDirective, ServerReply, SessionKind,
    SessionMetadata, StudentAnswer, SurveyMetadata,
};
use voice_drill::{Language, SessionError};

#[test]
fn test_answer_metadata_serialization() {
    let metadata = AnswerMetadata::new(42, 1001, "2025-03-14T09:30:00+01:00", "FRAC");

    let json = serde_json::to_string(&metadata).unwrap();
    assert_eq!(
        json,
        r#"{"student_id":42,"example_id":1001,"record_date":"2025-03-14T09:30:00+01:00","input_type":"FRAC","format":"pcm"}"#
    );

    let deserialized: AnswerMetadata = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, metadata);
}

#[test]
fn test_answer_metadata_format_defaults_to_pcm() {
    let json = r#"{"student_id":1,"example_id":2,"record_date":"x","input_type":"VAR"}"#;
    let metadata: AnswerMetadata = serde_json::from_str(json).unwrap();
    assert_eq!(metadata, AnswerMetadata::new(1, 2, "x", "VAR"));
}

#[test]
fn test_survey_metadata_serialization() {
    let metadata = SurveyMetadata::new("Which method did you use?", vec![12, 13]);

    let json = serde_json::to_string(&metadata).unwrap();
    assert!(json.contains(r#""question_type":"open-question""#));
    assert!(json.contains(r#""skills":[12,13]"#));
    assert!(json.contains(r#""format":"pcm""#));
}

#[test]
fn test_session_metadata_is_untagged() {
    let metadata: SessionMetadata = AnswerMetadata::new(1, 7, "2024-01-01T00:00:00Z", "inline").into();
    assert_eq!(metadata.kind(), SessionKind::Answer);

    let json = serde_json::to_value(&metadata).unwrap();
    assert_eq!(json["student_id"], 1);
    assert!(json.get("Answer").is_none());

    let survey: SessionMetadata = SurveyMetadata::new("?", vec![]).into();
    assert_eq!(survey.kind(), SessionKind::Survey);
}

#[test]
fn test_language_directive() {
    let json = serde_json::to_string(&LanguageDirective::from(Language::En)).unwrap();
    assert_eq!(json, r#"{"language":"en-US"}"#);

    let json = serde_json::to_string(&LanguageDirective::from(Language::default())).unwrap();
    assert_eq!(json, r#"{"language":"cs-CZ"}"#);
}

#[test]
fn test_endpoint_paths() {
    assert_eq!(SessionKind::Answer.endpoint_path(), "speech/");
    assert_eq!(SessionKind::Survey.endpoint_path(), "survey/");
}

#[test]
fn test_evaluation_reply() {
    let reply = parse_server_message(
        r#"{"isCorrect": true, "continue_with_next": false, "student_answer": "3/4"}"#,
    )
    .unwrap();

    let ServerReply::Evaluated(evaluation) = reply else {
        panic!("expected an evaluation, got {:?}", reply);
    };
    assert!(evaluation.is_correct);
    assert!(!evaluation.continue_with_next);
    assert_eq!(evaluation.student_answer, Some(StudentAnswer::Text("3/4".to_string())));
}

#[test]
fn test_skip_with_evaluation_fields_is_skip() {
    let reply = parse_server_message(r#"{"skipped": true, "isCorrect": true}"#).unwrap();
    assert_eq!(reply, ServerReply::Skipped);
}

#[test]
fn test_unknown_fields_are_ignored() {
    let reply = parse_server_message(r#"{"finished": true, "score": 17}"#).unwrap();
    assert_eq!(reply, ServerReply::Finished);
}

#[test]
fn test_array_is_protocol_error() {
    let result = parse_server_message("[1, 2, 3]");
    assert!(matches!(result, Err(SessionError::Protocol(_))));
}

#[test]
fn test_frame_wire_encoding() {
    let frame = PcmFrame {
        samples: vec![100, -200, 32767, -32768],
        sample_rate: 16000,
        sequence: 0,
        timestamp_ms: 0,
    };

    let bytes = frame.to_le_bytes();
    assert_eq!(bytes, vec![0x64, 0x00, 0x38, 0xff, 0xff, 0x7f, 0x00, 0x80]);
}
