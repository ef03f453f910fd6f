use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub toolchain: ToolchainConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub recordings_path: String,
    /// Sample rate the model expects extracted clips in
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct ToolchainConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    /// Transcriber binary invoked per pass
    pub binary: String,
    /// Directory holding model weights files
    pub models_path: String,
}

impl Config {
    /// Load `<path>.toml` when present, layered over coded defaults
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "streamscribe")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 8000)?
            .set_default("audio.recordings_path", "audio")?
            .set_default("audio.sample_rate", 16000)?
            .set_default("toolchain.ffmpeg", "ffmpeg")?
            .set_default("toolchain.ffprobe", "ffprobe")?
            .set_default("model.binary", "whisper-cli")?
            .set_default("model.models_path", "models")?
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
