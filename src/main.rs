use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use candor::media::WavFileMicrophone;
use candor::transport::WsControlChannel;
use candor::{Backend, BackendClient, InterviewSession, Settings};

/// Headless interview session runner.
///
/// Runs an audio-only session against the gateway provider variant with a
/// WAV file standing in for the candidate microphone. Useful for smoke runs
/// against a live backend without a browser.
#[derive(Parser, Debug)]
#[command(name = "candor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Session identifier to run
    #[arg(short = 's', long = "session-id")]
    session_id: String,

    /// WAV file used as the candidate microphone (16-bit mono)
    #[arg(short = 'a', long = "audio", value_name = "FILE")]
    audio: PathBuf,

    /// Gateway realtime WebSocket endpoint
    #[arg(long = "channel-url", default_value = "ws://localhost:8088/v1/realtime")]
    channel_url: String,

    /// Bearer token for the gateway endpoint
    #[arg(long = "token")]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before settings loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let backend = BackendClient::new(settings.backend_url.clone());
    let descriptor = backend.fetch_session(&cli.session_id).await?;
    info!(
        session_id = %descriptor.session_id,
        alternate = descriptor.use_alternate_provider,
        "Fetched session descriptor"
    );

    let url = format!("{}?model={}", cli.channel_url, settings.model);
    let (channel, events) = WsControlChannel::connect(&url, cli.token.as_deref()).await?;

    let (session, control) = InterviewSession::new(
        settings,
        descriptor,
        Arc::new(backend.clone()),
        Arc::new(backend),
        Arc::new(WavFileMicrophone::new(cli.audio)),
        Arc::new(channel),
        events,
    );

    // Ctrl-C maps to the user-stop path; teardown still runs once.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping session");
            control.stop().await;
        }
    });

    let report = session.run().await?;
    info!(
        cause = report.cause.as_str(),
        estimated_cost_usd = report.cost.estimated_cost_usd,
        recorded = report.artifact.is_some(),
        "Session finished"
    );
    println!("{}", report.transcript);
    Ok(())
}
