use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::media::{ChannelSelection, ExtractSpec, MediaToolchain};

/// Seconds of buffered audio required before a streaming pass may fire
pub const TRIGGER_THRESHOLD_SECS: f64 = 6.0;

/// Sliding window length re-transcribed on each streaming pass
pub const WINDOW_SECS: f64 = 9.0;

/// Overlap re-covered by the next pass so word fragments at a window
/// boundary are not lost
pub const OVERLAP_MARGIN_SECS: f64 = 2.0;

/// Remainders shorter than this are negligible, not worth a final pass
const MIN_REMAINDER_SECS: f64 = 0.5;

const WINDOW_EXTRACT_TIMEOUT: Duration = Duration::from_secs(10);
const REMAINDER_EXTRACT_TIMEOUT: Duration = Duration::from_secs(30);

/// Point-in-time copy of the accumulator counters, taken under the lock
#[derive(Debug, Clone)]
pub struct AccumulatorSnapshot {
    pub since_trigger: f64,
    pub absolute_duration: f64,
    pub last_transcribed_position: f64,
    pub last_emitted_text: String,
}

#[derive(Debug, Default)]
struct Counters {
    /// Seconds appended since the last transcription pass fired
    since_trigger: f64,
    /// Total seconds appended this recording, client-reported
    absolute_duration: f64,
    /// End of the span already covered by a pass, minus the overlap margin
    last_transcribed_position: f64,
    /// Full text of the most recent pass, the aligner's anchor
    last_emitted_text: String,
}

/// Owns the append-only audio container for one in-progress recording.
///
/// The container is only ever appended to; the single rewrite is the atomic
/// metadata repair at finalization. Appends and counter snapshots share one
/// lock so an extraction never observes an inconsistent (duration, file)
/// pair while chunks keep arriving.
pub struct AudioAccumulator {
    session_id: String,
    audio_dir: PathBuf,
    container_path: PathBuf,
    sample_rate: u32,
    toolchain: Arc<dyn MediaToolchain>,
    counters: Mutex<Counters>,
}

impl AudioAccumulator {
    pub fn new(
        audio_dir: PathBuf,
        session_id: String,
        sample_rate: u32,
        toolchain: Arc<dyn MediaToolchain>,
    ) -> Self {
        let container_path = audio_dir.join(format!("{}_recording.webm", session_id));

        Self {
            session_id,
            audio_dir,
            container_path,
            sample_rate,
            toolchain,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    /// Append one client chunk to the container and advance both duration
    /// counters. Appends are serialized by the counter lock: the container
    /// format does not survive interleaved writers.
    pub async fn add_chunk(&self, data: &[u8], duration: f64) -> Result<()> {
        let mut counters = self.counters.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.container_path)
            .await
            .with_context(|| format!("Failed to open container {}", self.container_path.display()))?;

        file.write_all(data)
            .await
            .context("Failed to append audio chunk")?;
        file.flush()
            .await
            .context("Failed to flush audio chunk")?;

        counters.since_trigger += duration;
        counters.absolute_duration += duration;

        debug!(
            "Appended {} bytes, total duration: {:.1}s",
            data.len(),
            counters.absolute_duration
        );

        Ok(())
    }

    /// True once enough audio accumulated since the last pass
    pub async fn should_trigger(&self) -> bool {
        self.counters.lock().await.since_trigger >= TRIGGER_THRESHOLD_SECS
    }

    pub async fn absolute_duration(&self) -> f64 {
        self.counters.lock().await.absolute_duration
    }

    pub async fn snapshot(&self) -> AccumulatorSnapshot {
        let counters = self.counters.lock().await;
        AccumulatorSnapshot {
            since_trigger: counters.since_trigger,
            absolute_duration: counters.absolute_duration,
            last_transcribed_position: counters.last_transcribed_position,
            last_emitted_text: counters.last_emitted_text.clone(),
        }
    }

    /// Cut the most recent window out of the container into a fresh WAV for
    /// the model. Returns `None` on any toolchain failure; the caller skips
    /// this pass and waits for the next trigger.
    pub async fn extract_window(
        &self,
        channel: ChannelSelection,
        chunk_index: u64,
    ) -> Option<PathBuf> {
        let total = {
            let counters = self.counters.lock().await;
            if !self.container_path.exists() {
                return None;
            }
            counters.absolute_duration
        };

        let (start, duration) = if total <= WINDOW_SECS {
            (0.0, total)
        } else {
            (total - WINDOW_SECS, WINDOW_SECS)
        };

        let dest = self
            .audio_dir
            .join(format!("{}_chunk{}.wav", self.session_id, chunk_index));
        let spec = ExtractSpec {
            start,
            duration: Some(duration),
            channel,
            sample_rate: self.sample_rate,
            timeout: WINDOW_EXTRACT_TIMEOUT,
        };

        match self
            .toolchain
            .extract_audio(&self.container_path, &dest, &spec)
            .await
        {
            Ok(()) => {
                info!(
                    "Extracted sliding window: {:.1}s to {:.1}s",
                    start,
                    start + duration
                );
                Some(dest)
            }
            Err(e) => {
                error!("Sliding window extraction failed: {:#}", e);
                None
            }
        }
    }

    /// Extract everything not yet covered by a pass (re-covering the overlap
    /// margin) for the final transcription. The container is probed for its
    /// authoritative duration because the tracked value is client-reported
    /// and can drift; probing failure falls back to the tracked value.
    pub async fn extract_remainder(&self, channel: ChannelSelection) -> Option<PathBuf> {
        let (tracked, start) = {
            let counters = self.counters.lock().await;
            if !self.container_path.exists() {
                error!("Container not found for session {}", self.session_id);
                return None;
            }
            (
                counters.absolute_duration,
                (counters.last_transcribed_position - OVERLAP_MARGIN_SECS).max(0.0),
            )
        };

        let actual = match self.toolchain.probe_duration(&self.container_path).await {
            Ok(duration) => {
                info!("Probed container duration: {:.2}s", duration);
                duration
            }
            Err(e) => {
                warn!("Duration probe failed, using tracked duration: {:#}", e);
                tracked
            }
        };

        let remaining = actual - start;
        if remaining < MIN_REMAINDER_SECS {
            info!(
                "Only {:.1}s remaining, skipping final transcription",
                remaining
            );
            return None;
        }

        let dest = self
            .audio_dir
            .join(format!("{}_final.wav", self.session_id));
        let spec = ExtractSpec {
            start,
            duration: None,
            channel,
            sample_rate: self.sample_rate,
            timeout: REMAINDER_EXTRACT_TIMEOUT,
        };

        match self
            .toolchain
            .extract_audio(&self.container_path, &dest, &spec)
            .await
        {
            Ok(()) => {
                info!(
                    "Extracted final audio from {:.1}s to end of file ({:.2}s)",
                    start, actual
                );
                Some(dest)
            }
            Err(e) => {
                error!("Final extraction failed: {:#}", e);
                None
            }
        }
    }

    /// Re-encode the container so it carries duration and cue metadata.
    /// The original is replaced only when the re-encode produced non-empty
    /// output; on failure it is left untouched and the temp file discarded.
    pub async fn repair_container(&self) -> Result<()> {
        if !self.container_path.exists() {
            warn!("No container to repair for session {}", self.session_id);
            return Ok(());
        }

        let temp = self
            .audio_dir
            .join(format!("{}_fixed.webm", self.session_id));

        match self
            .toolchain
            .remux_seekable(&self.container_path, &temp)
            .await
        {
            Ok(()) => {
                tokio::fs::rename(&temp, &self.container_path)
                    .await
                    .context("Failed to replace container with repaired copy")?;
                info!("Repaired container metadata: {}", self.container_path.display());
                Ok(())
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&temp).await {
                    debug!("Could not remove repair temp file: {}", remove_err);
                }
                Err(e).context("Container repair failed")
            }
        }
    }

    /// Record the outcome of a transcription pass: remember the full emitted
    /// text as the next alignment anchor, pull the transcribed cursor back by
    /// the overlap margin, and re-arm the trigger.
    pub async fn mark_transcribed(&self, full_text: String) {
        let mut counters = self.counters.lock().await;
        counters.last_emitted_text = full_text;
        counters.last_transcribed_position =
            (counters.absolute_duration - OVERLAP_MARGIN_SECS).max(0.0);
        counters.since_trigger = 0.0;
    }
}
