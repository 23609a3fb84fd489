use super::state::AppState;
use crate::audio::AudioBackendFactory;
use crate::error::{CaptureError, SessionError};
use crate::language::Language;
use crate::protocol::{AnswerMetadata, SessionMetadata, SurveyMetadata};
use crate::session::{SessionEvent, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartAnswerRequest {
    pub student_id: i64,
    pub example_id: i64,

    /// Practice record timestamp (default: now, RFC 3339)
    pub record_date: Option<String>,

    /// Answer input type of the example (default: "INLINE")
    #[serde(default = "default_input_type")]
    pub input_type: String,
}

fn default_input_type() -> String {
    "INLINE".to_string()
}

impl StartAnswerRequest {
    fn into_metadata(self) -> AnswerMetadata {
        let record_date = self
            .record_date
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        AnswerMetadata::new(self.student_id, self.example_id, record_date, self.input_type)
    }
}

#[derive(Debug, Deserialize)]
pub struct StartSurveyRequest {
    pub question_text: String,

    #[serde(default)]
    pub skills: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    /// "cs", "en", "cs-CZ" or "en-US"
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct LanguageResponse {
    pub language: Language,
    pub locale: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// HTTP status for a failed session operation
pub fn session_error_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::Capture(CaptureError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
        SessionError::Capture(CaptureError::NoInputDevice)
        | SessionError::Capture(CaptureError::DeviceNotFound(_)) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Capture(CaptureError::File(_)) => StatusCode::BAD_REQUEST,
        SessionError::Connect { .. } | SessionError::Transport(_) => StatusCode::BAD_GATEWAY,
        SessionError::Closed | SessionError::KindMismatch { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn session_error_response(e: SessionError) -> Response {
    error_response(session_error_status(&e), e)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/answer
/// Start an answer session (replaces any active session)
pub async fn start_answer(
    State(state): State<AppState>,
    Json(req): Json<StartAnswerRequest>,
) -> Response {
    info!(
        "Starting answer session for student {} example {}",
        req.student_id, req.example_id
    );
    start_session(state, req.into_metadata().into()).await
}

/// POST /session/survey
/// Start a survey session (replaces any active session)
pub async fn start_survey(
    State(state): State<AppState>,
    Json(req): Json<StartSurveyRequest>,
) -> Response {
    info!("Starting survey session");
    start_session(state, SurveyMetadata::new(req.question_text, req.skills).into()).await
}

async fn start_session(state: AppState, metadata: SessionMetadata) -> Response {
    let backend = match AudioBackendFactory::create(state.source.clone(), state.backend_config.clone()) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create audio backend: {}", e);
            return session_error_response(e.into());
        }
    };

    let mut session = state.session.lock().await;
    match session.start(metadata, backend).await {
        Ok(events_rx) => {
            state.collect_events(events_rx).await;
            let session_id = session.session_id().unwrap_or_default().to_string();
            info!("Session {} started", session_id);
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    session_id: session_id.clone(),
                    status: "open".to_string(),
                    message: format!("Session {} started", session_id),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start session: {}", e);
            session_error_response(e)
        }
    }
}

/// POST /session/stop
/// Stop the active session; stopping an idle slot is not an error
pub async fn stop_session(State(state): State<AppState>) -> Response {
    let stats = state.session.lock().await.stop().await;
    (
        StatusCode::OK,
        Json(StopSessionResponse {
            status: "closed".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// GET /session/status
pub async fn session_status(State(state): State<AppState>) -> Json<SessionStats> {
    Json(state.session.lock().await.stats().await)
}

/// GET /session/events
/// Events of the current (or last) session
pub async fn session_events(State(state): State<AppState>) -> Json<Vec<SessionEvent>> {
    Json(state.events.read().await.clone())
}

/// PUT /session/language
pub async fn change_language(
    State(state): State<AppState>,
    Json(req): Json<LanguageRequest>,
) -> Response {
    let Some(language) = Language::from_code(&req.language) else {
        warn!("Rejecting unknown language {:?}", req.language);
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported language: {}", req.language),
        );
    };

    let mut session = state.session.lock().await;
    match session.change_language(language) {
        Ok(()) => (
            StatusCode::OK,
            Json(LanguageResponse {
                language,
                locale: language.locale_tag().to_string(),
            }),
        )
            .into_response(),
        Err(e) => session_error_response(e),
    }
}

/// PUT /session/example
/// Send metadata for the next example over the open answer session
pub async fn update_example(
    State(state): State<AppState>,
    Json(req): Json<StartAnswerRequest>,
) -> Response {
    let mut session = state.session.lock().await;
    match session.update_metadata(req.into_metadata()) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!("Metadata update rejected: {}", e);
            session_error_response(e)
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
