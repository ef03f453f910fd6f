use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Real-time transcription protocol
        .route("/ws/transcribe", get(handlers::ws_transcribe))
        // Persisted recordings, served for playback and resume
        .nest_service("/api/audio", ServeDir::new(&state.audio_dir))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
