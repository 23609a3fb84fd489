//! HTTP API server for local control (drill UI, scripts)
//!
//! One session slot, driven by:
//! - POST /session/answer - Start an answer session
//! - POST /session/survey - Start a survey session
//! - POST /session/stop - Stop the active session
//! - PUT /session/language - Switch the recognizer language
//! - PUT /session/example - Send metadata for the next example
//! - GET /session/status - Session statistics
//! - GET /session/events - Events of the current session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::session_error_status;
pub use routes::create_router;
pub use state::AppState;
