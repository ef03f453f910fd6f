use serde::{Deserialize, Serialize};

use crate::model::TranscriptSegment;

/// Client → server control and data messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SetModel {
        #[serde(default = "default_model")]
        model: String,
    },
    SetChannel {
        #[serde(default = "default_channel")]
        channel: String,
    },
    SetLanguage {
        /// Absent or null means auto-detect
        #[serde(default)]
        language: Option<String>,
    },
    SetResumeTranscription {
        #[serde(default)]
        transcription_id: Option<String>,
    },
    SetResumeAudio {
        #[serde(default)]
        audio_path: Option<String>,
    },
    AudioChunk {
        /// Base64-encoded container bytes
        #[serde(default)]
        data: String,
        /// Client-reported chunk duration, seconds
        #[serde(default)]
        duration: f64,
    },
    EndRecording,
    Ping,
}

fn default_model() -> String {
    "base".to_string()
}

fn default_channel() -> String {
    "both".to_string()
}

/// Server → client events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
    },
    /// Periodic progress while a model load is in flight
    DownloadProgress {
        message: String,
        elapsed_seconds: u64,
    },
    ModelReady {
        message: String,
    },
    ProcessingAudio {
        message: String,
    },
    Transcription {
        segments: Vec<TranscriptSegment>,
        streaming: bool,
        #[serde(rename = "final")]
        final_pass: bool,
        text: String,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    /// Plain status with no session or artifact metadata
    pub fn status(message: impl Into<String>) -> Self {
        ServerMessage::Status {
            message: message.into(),
            session_id: None,
            audio_url: None,
            duration_seconds: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
