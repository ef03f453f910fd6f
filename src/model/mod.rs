//! Speech model boundary
//!
//! The speech-to-text model is an external collaborator: every call is an
//! independent transcription of one short mono clip, with no cross-call
//! state (continuity between passes belongs to the aligner, not the model).

mod whisper_cli;

pub use whisper_cli::WhisperCliModel;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::ChannelSelection;

/// A single timed transcript segment produced by a model pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    /// Offset from the start of the transcribed clip, seconds
    pub start: f64,
    pub end: f64,
}

/// Black-box speech-to-text model
#[async_trait]
pub trait SpeechModel: Send + Sync {
    /// Client-facing identifier this handle was created for
    fn name(&self) -> &str;

    /// Transcribe one audio file into ordered segments. Must tolerate being
    /// invoked on short clips repeatedly within one session.
    async fn transcribe(
        &self,
        audio_path: &Path,
        channel: ChannelSelection,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>>;
}

/// Source of per-session model handles
///
/// Sessions never share model state through globals; each `set_model`
/// request gets a fresh handle from the provider injected at startup.
pub trait ModelProvider: Send + Sync {
    fn create(&self, model_name: &str) -> Arc<dyn SpeechModel>;
}

/// Builds whisper CLI handles from client-facing model identifiers
pub struct ModelCatalog {
    binary: PathBuf,
    models_dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(binary: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            models_dir: models_dir.into(),
        }
    }

    /// Weights file for a canonical model size
    fn weights_path(&self, size: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{}.bin", size))
    }
}

impl ModelProvider for ModelCatalog {
    fn create(&self, model_name: &str) -> Arc<dyn SpeechModel> {
        let size = canonical_model_size(model_name);
        Arc::new(WhisperCliModel::new(
            model_name,
            self.binary.clone(),
            self.weights_path(size),
        ))
    }
}

/// Map client-facing model identifiers to canonical sizes. Browser clients
/// send HuggingFace-style repo names; bare sizes and distil variants pass
/// through unchanged.
pub fn canonical_model_size(name: &str) -> &str {
    match name {
        "mlx-community/whisper-tiny-mlx" | "mlx-community/whisper-tiny" => "tiny",
        "mlx-community/whisper-base-mlx" | "mlx-community/whisper-base" => "base",
        "mlx-community/whisper-small-mlx" | "mlx-community/whisper-small" => "small",
        "mlx-community/whisper-medium-mlx" | "mlx-community/whisper-medium" => "medium",
        "mlx-community/whisper-large-v3-mlx" | "mlx-community/whisper-large-v3" => "large-v3",
        other => other,
    }
}

/// Human-facing model name for status messages ("large-v3" -> "Large V3")
pub fn display_name(size: &str) -> String {
    size.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
