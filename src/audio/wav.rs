use std::path::Path;

use anyhow::{Context, Result};

/// Write `seconds` of 16-bit mono silence to `path`.
///
/// Used to push a trivial clip through a freshly selected model so
/// configuration errors surface before the first real chunk arrives.
pub fn write_silence(path: &Path, seconds: f64, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

    let samples = (seconds * sample_rate as f64) as usize;
    for _ in 0..samples {
        writer
            .write_sample(0i16)
            .context("Failed to write sample to WAV")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(())
}
