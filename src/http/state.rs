use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::media::{FfmpegToolchain, MediaToolchain};
use crate::model::{ModelCatalog, ModelProvider};
use crate::session::SessionContext;

/// Transcription passes allowed in flight across all sessions; transcription
/// dominates cost, so a small bound keeps the host responsive
const MAX_CONCURRENT_PASSES: usize = 2;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub audio_dir: PathBuf,
    pub sample_rate: u32,
    pub toolchain: Arc<dyn MediaToolchain>,
    pub models: Arc<dyn ModelProvider>,
    pub passes: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            audio_dir: PathBuf::from(&config.audio.recordings_path),
            sample_rate: config.audio.sample_rate,
            toolchain: Arc::new(FfmpegToolchain::new(
                config.toolchain.ffmpeg.clone(),
                config.toolchain.ffprobe.clone(),
            )),
            models: Arc::new(ModelCatalog::new(
                config.model.binary.clone(),
                config.model.models_path.clone(),
            )),
            passes: Arc::new(Semaphore::new(MAX_CONCURRENT_PASSES)),
        }
    }

    /// Collaborator bundle handed to each connection's session
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            audio_dir: self.audio_dir.clone(),
            sample_rate: self.sample_rate,
            toolchain: Arc::clone(&self.toolchain),
            models: Arc::clone(&self.models),
            passes: Arc::clone(&self.passes),
        }
    }
}
