//! External media toolchain boundary
//!
//! All container-level audio operations (trimming, probing, concatenation,
//! re-encoding for seekability) are delegated to an external argv-based
//! toolchain. This module defines the trait sessions and accumulators talk
//! to, plus the ffmpeg/ffprobe implementation.

mod ffmpeg;

pub use ffmpeg::FfmpegToolchain;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which input channel to keep when downmixing to mono for the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelection {
    Left,
    Right,
    Both,
}

impl ChannelSelection {
    /// Lenient parse: unrecognized values are coerced to `Both` with a
    /// warning rather than rejected
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "left" => ChannelSelection::Left,
            "right" => ChannelSelection::Right,
            "both" => ChannelSelection::Both,
            other => {
                warn!("Invalid channel selection: {}, defaulting to 'both'", other);
                ChannelSelection::Both
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelSelection::Left => "left",
            ChannelSelection::Right => "right",
            ChannelSelection::Both => "both",
        }
    }
}

impl fmt::Display for ChannelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a single trim-and-downmix extraction
#[derive(Debug, Clone)]
pub struct ExtractSpec {
    /// Offset into the source container, seconds
    pub start: f64,
    /// Span to extract; `None` means "through end of file"
    pub duration: Option<f64>,
    /// Downmix selection applied while extracting
    pub channel: ChannelSelection,
    /// Output sample rate expected by the model
    pub sample_rate: u32,
    /// Process deadline; expiry is a soft failure for the caller
    pub timeout: Duration,
}

/// External media toolchain contract
///
/// Implementations run synchronous external processes with captured output
/// and bounded timeouts. Every operation returns `Err` on timeout, non-zero
/// exit, or missing/empty output; callers treat these as soft failures.
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Cut a span out of `src` into `dest`, downmixed and resampled
    async fn extract_audio(&self, src: &Path, dest: &Path, spec: &ExtractSpec) -> Result<()>;

    /// Authoritative container duration in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Stream-copy concatenation of the files named in `list_file`
    /// (concat-demuxer list format), no re-encoding
    async fn concat_copy(&self, list_file: &Path, dest: &Path) -> Result<()>;

    /// Re-encode `src` into `dest` so the result carries duration and seek
    /// metadata that incrementally-written containers lack
    async fn remux_seekable(&self, src: &Path, dest: &Path) -> Result<()>;
}
