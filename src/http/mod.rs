//! HTTP and WebSocket surface
//!
//! - GET /ws/transcribe - real-time transcription protocol
//! - GET /api/audio/:file - persisted recordings for playback and resume
//! - GET /health - health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
