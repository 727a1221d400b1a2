use std::path::PathBuf;

use clap::Parser;

use vitrine_server::{EncoderConfig, ServerConfig, SessionConfig, Viewport};
use vitrine_telemetry::TelemetryConfig;

/// Remote isolated browsing relay with an evidence pipeline.
#[derive(Parser, Debug)]
#[command(name = "vitrine", version)]
struct Cli {
    /// Port the relay listens on.
    #[arg(long, default_value_t = 4000)]
    port: u16,

    /// DevTools endpoint of the remote browser (http:// or ws:// URL).
    #[arg(
        long,
        env = "VITRINE_BROWSER_ENDPOINT",
        default_value = "http://127.0.0.1:9222"
    )]
    browser_endpoint: String,

    /// Directory session storage is created under.
    #[arg(long, env = "VITRINE_STORAGE_ROOT", default_value = "./sessions")]
    storage_root: PathBuf,

    /// Start page when the client does not request one.
    #[arg(long, default_value = "https://www.google.com")]
    home_url: String,

    /// Virtual viewport width, fixed for every session.
    #[arg(long, default_value_t = 1920)]
    viewport_width: u32,

    /// Virtual viewport height, fixed for every session.
    #[arg(long, default_value_t = 1080)]
    viewport_height: u32,

    /// Encoder program session frames are piped through.
    #[arg(long, default_value = "ffmpeg")]
    encoder: String,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    vitrine_telemetry::init_telemetry(&TelemetryConfig {
        json_output: cli.json_logs,
        ..Default::default()
    });

    let config = ServerConfig {
        port: cli.port,
        session: SessionConfig {
            storage_root: cli.storage_root,
            browser_endpoint: cli.browser_endpoint,
            default_url: cli.home_url,
            viewport: Viewport {
                width: cli.viewport_width,
                height: cli.viewport_height,
            },
            encoder: EncoderConfig {
                program: cli.encoder,
                ..Default::default()
            },
        },
        ..Default::default()
    };

    let handle = vitrine_server::start(config).await?;
    tracing::info!(port = handle.port, "vitrine ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let closed = handle.shutdown().await;
    if closed > 0 {
        tracing::info!(sessions = closed, "live sessions closed");
    }
    Ok(())
}
