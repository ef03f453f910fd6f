use anyhow::{Context, Result};
use clap::Parser;
use streamscribe::{create_router, AppState, Config};
use tracing::info;

/// Real-time streaming transcription service
#[derive(Debug, Parser)]
#[command(name = "streamscribe", version)]
struct Args {
    /// Config file stem (TOML, optional)
    #[arg(long, default_value = "config/streamscribe")]
    config: String,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,

    /// Override the recordings directory
    #[arg(long)]
    audio_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }
    if let Some(audio_dir) = args.audio_dir {
        cfg.audio.recordings_path = audio_dir;
    }

    info!("{} starting", cfg.service.name);
    info!("Recordings directory: {}", cfg.audio.recordings_path);

    std::fs::create_dir_all(&cfg.audio.recordings_path).with_context(|| {
        format!(
            "Failed to create recordings directory {}",
            cfg.audio.recordings_path
        )
    })?;

    let state = AppState::new(&cfg);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;

    Ok(())
}
