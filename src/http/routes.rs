use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/session/answer", post(handlers::start_answer))
        .route("/session/survey", post(handlers::start_survey))
        .route("/session/stop", post(handlers::stop_session))
        // Mid-session updates
        .route("/session/language", put(handlers::change_language))
        .route("/session/example", put(handlers::update_example))
        // Session queries
        .route("/session/status", get(handlers::session_status))
        .route("/session/events", get(handlers::session_events))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // The drill UI calls in from the browser
        .layer(CorsLayer::permissive())
        .with_state(state)
}
