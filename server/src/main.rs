use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voiceid::{AppState, Config};

#[derive(Parser)]
#[command(name = "voiceid-server", about = "Speaker identification service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default if no subcommand is given).
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load configuration from the environment and exit, without binding a socket.
    CheckConfig,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Built by hand rather than via `#[tokio::main]` so `Config::worker_threads`
/// (§5: the blocking-pool-backed worker pool is "sized via `Config::worker_threads`")
/// actually reaches the runtime instead of being parsed and discarded.
fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Some(Command::CheckConfig) => {
            tracing::info!(addr = %config.socket_addr(), "configuration loaded successfully");
            return Ok(());
        }
        Some(Command::Serve { bind, port }) => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
        }
        None => {}
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.work_dir).await?;

    let state = AppState::new(config)?;
    spawn_session_sweeper(state.clone());

    let addr = state.config.socket_addr();
    let router = voiceid::routes::build_router(state);

    tracing::info!(%addr, "starting voiceid-server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Periodically evicts sessions past their TTL (§4.8). Runs for the lifetime of
/// the process; there is no shutdown signal wired up since sweeps are idempotent
/// and harmless to interrupt.
fn spawn_session_sweeper(state: std::sync::Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            state.session_store.sweep_expired(chrono::Utc::now()).await;
        }
    });
}
