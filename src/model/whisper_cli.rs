use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{SpeechModel, TranscriptSegment};
use crate::media::ChannelSelection;

/// whisper.cpp-style command line transcriber
///
/// Invokes the configured binary once per clip with JSON output enabled and
/// parses the emitted segment list. The extracted clip is already downmixed
/// and resampled, so the channel selection is informational here.
pub struct WhisperCliModel {
    name: String,
    binary: PathBuf,
    weights: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(default)]
    transcription: Vec<CliSegment>,
}

#[derive(Debug, Deserialize)]
struct CliSegment {
    offsets: CliOffsets,
    text: String,
}

/// Segment bounds in milliseconds from the start of the clip
#[derive(Debug, Deserialize)]
struct CliOffsets {
    from: u64,
    to: u64,
}

impl WhisperCliModel {
    pub fn new(name: impl Into<String>, binary: PathBuf, weights: PathBuf) -> Self {
        Self {
            name: name.into(),
            binary,
            weights,
        }
    }
}

#[async_trait]
impl SpeechModel for WhisperCliModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(
        &self,
        audio_path: &Path,
        _channel: ChannelSelection,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        // the CLI writes its JSON next to the requested output prefix
        let prefix = audio_path.with_extension("");
        let json_path = prefix.with_extension("json");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.weights)
            .arg("-f")
            .arg(audio_path)
            .arg("-oj")
            .arg("-of")
            .arg(&prefix)
            .arg("-l")
            .arg(language.unwrap_or("auto"))
            .arg("-np")
            .kill_on_drop(true);

        debug!(
            "Running transcriber {} on {}",
            self.binary.display(),
            audio_path.display()
        );

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to spawn transcriber {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "Transcriber exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let raw = tokio::fs::read_to_string(&json_path)
            .await
            .with_context(|| format!("Transcriber output missing: {}", json_path.display()))?;

        if let Err(e) = tokio::fs::remove_file(&json_path).await {
            debug!("Could not remove transcriber output {}: {}", json_path.display(), e);
        }

        let parsed: CliOutput =
            serde_json::from_str(&raw).context("Unparseable transcriber JSON output")?;

        let mut segments: Vec<TranscriptSegment> = parsed
            .transcription
            .into_iter()
            .map(|seg| TranscriptSegment {
                text: seg.text,
                start: seg.offsets.from as f64 / 1000.0,
                end: seg.offsets.to as f64 / 1000.0,
            })
            .collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        info!(
            "Transcribed {}: {} segments",
            audio_path.display(),
            segments.len()
        );

        Ok(segments)
    }
}
