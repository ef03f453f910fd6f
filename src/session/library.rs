use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::media::MediaToolchain;

/// URL prefix under which persisted recordings are served to the browser
pub const AUDIO_URL_PREFIX: &str = "/api/audio/";

/// A prior persisted recording that this recording's audio will be appended
/// to at finalization
#[derive(Debug, Clone)]
pub struct ResumeContext {
    pub audio_path: PathBuf,
    /// Duration known up front; 0.0 means unknown, probed again before concat
    pub known_duration: f64,
}

/// Resolves previously persisted recordings in the recordings directory.
///
/// Recordings are addressed by the session id they were written under, so an
/// id lookup is a filename-convention lookup rather than a database query.
pub struct RecordingLibrary {
    audio_dir: PathBuf,
    toolchain: Arc<dyn MediaToolchain>,
}

impl RecordingLibrary {
    pub fn new(audio_dir: PathBuf, toolchain: Arc<dyn MediaToolchain>) -> Self {
        Self {
            audio_dir,
            toolchain,
        }
    }

    /// Look up a prior recording by its transcription id
    pub async fn find_by_id(&self, transcription_id: &str) -> Option<ResumeContext> {
        let candidates = [
            format!("{}_recording.webm", transcription_id),
            format!("{}.webm", transcription_id),
        ];

        for name in candidates {
            let path = self.audio_dir.join(&name);
            if !path.exists() {
                continue;
            }

            let known_duration = match self.toolchain.probe_duration(&path).await {
                Ok(duration) => duration,
                Err(e) => {
                    warn!("Could not probe resumed recording duration: {:#}", e);
                    0.0
                }
            };

            info!(
                "Resolved transcription {} to {}",
                transcription_id,
                path.display()
            );
            return Some(ResumeContext {
                audio_path: path,
                known_duration,
            });
        }

        None
    }

    /// Look up a prior recording by the path it was served under. The caller
    /// validates the `/api/audio/` prefix; this resolves the filename.
    pub fn find_by_served_name(&self, filename: &str) -> Option<ResumeContext> {
        let path = self.audio_dir.join(filename);
        if path.exists() {
            Some(ResumeContext {
                audio_path: path,
                known_duration: 0.0,
            })
        } else {
            None
        }
    }
}
