//! Transcription protocol sessions
//!
//! This module provides the per-connection `TranscribeSession` state machine:
//! - Model selection and verification
//! - Audio chunk buffering and streaming transcription triggers
//! - Overlap deduplication between sliding-window passes
//! - Finalization, resume concatenation, and session reset

pub mod library;
pub mod messages;
mod session;

pub use library::{RecordingLibrary, ResumeContext, AUDIO_URL_PREFIX};
pub use messages::{ClientMessage, ServerMessage};
pub use session::{SessionContext, TranscribeSession};
