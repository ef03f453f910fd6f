use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ChannelSelection, ExtractSpec, MediaToolchain};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const CONCAT_TIMEOUT: Duration = Duration::from_secs(60);
const REMUX_TIMEOUT: Duration = Duration::from_secs(120);

/// Opus bitrate used when re-encoding a container for seekability
const REMUX_BITRATE: &str = "128k";
/// Cue point interval written during the seekability remux, milliseconds
const CUE_INTERVAL_MS: u32 = 5000;

/// ffmpeg/ffprobe-backed media toolchain
pub struct FfmpegToolchain {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegToolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Mono downmix filter for the selected channel
    fn pan_filter(channel: ChannelSelection) -> &'static str {
        match channel {
            ChannelSelection::Left => "pan=1c|c0=c0",
            ChannelSelection::Right => "pan=1c|c0=c1",
            ChannelSelection::Both => "pan=1c|c0=0.5*c0+0.5*c1",
        }
    }

    async fn run(&self, program: &Path, args: &[String], limit: Duration) -> Result<Output> {
        debug!("Running {} {:?}", program.display(), args);

        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| anyhow!("{} timed out after {:?}", program.display(), limit))?
            .with_context(|| format!("Failed to spawn {}", program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            ));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn extract_audio(&self, src: &Path, dest: &Path, spec: &ExtractSpec) -> Result<()> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            src.display().to_string(),
            "-ss".to_string(),
            spec.start.to_string(),
        ];

        if let Some(duration) = spec.duration {
            args.push("-t".to_string());
            args.push(duration.to_string());
        }

        args.extend([
            "-af".to_string(),
            Self::pan_filter(spec.channel).to_string(),
            "-ar".to_string(),
            spec.sample_rate.to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            dest.display().to_string(),
        ]);

        self.run(&self.ffmpeg, &args, spec.timeout).await?;
        ensure_nonempty_output(dest)?;

        info!(
            "Extracted audio from {}: start={:.1}s duration={:?}",
            src.display(),
            spec.start,
            spec.duration
        );
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.display().to_string(),
        ];

        let output = self.run(&self.ffprobe, &args, PROBE_TIMEOUT).await?;
        let text = String::from_utf8_lossy(&output.stdout);

        text.trim()
            .parse::<f64>()
            .with_context(|| format!("Unparseable probe output: {:?}", text.trim()))
    }

    async fn concat_copy(&self, list_file: &Path, dest: &Path) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_file.display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            dest.display().to_string(),
        ];

        self.run(&self.ffmpeg, &args, CONCAT_TIMEOUT).await?;
        ensure_nonempty_output(dest)?;

        info!("Concatenated into {}", dest.display());
        Ok(())
    }

    async fn remux_seekable(&self, src: &Path, dest: &Path) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            src.display().to_string(),
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            REMUX_BITRATE.to_string(),
            "-f".to_string(),
            "webm".to_string(),
            "-cluster_time_limit".to_string(),
            CUE_INTERVAL_MS.to_string(),
            "-cues_to_front".to_string(),
            "1".to_string(),
            "-reserve_index_space".to_string(),
            "50000".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            dest.display().to_string(),
        ];

        self.run(&self.ffmpeg, &args, REMUX_TIMEOUT).await?;
        ensure_nonempty_output(dest)?;

        info!("Remuxed {} with seek metadata", src.display());
        Ok(())
    }
}

/// The toolchain reporting success with a missing or empty output file still
/// counts as a failed operation
fn ensure_nonempty_output(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Toolchain reported success but {} is missing", path.display()))?;

    if metadata.len() == 0 {
        return Err(anyhow!("Toolchain produced empty output: {}", path.display()));
    }

    Ok(())
}
