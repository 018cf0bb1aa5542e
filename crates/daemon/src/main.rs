//! Conduit bridge daemon - Main Entry Point

mod app;
mod config;
mod handlers;
mod logging;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use app::Daemon;
use config::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "conduit-bridge")]
#[command(about = "Conduit CI bridge daemon", version)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "CONDUIT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration (defaults, file, CONDUIT_* env)
    let settings = Settings::load(args.config.as_deref())?;

    // 2. Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init(&settings.log_format, settings.log_dir.as_deref())?;

    info!("Conduit bridge v{} starting...", VERSION);

    // 3. Wire and start queues, workers, router and RPC server
    let daemon = Daemon::start(&settings).await?;

    info!(rpc_addr = %daemon.rpc_addr(), "System ready. Waiting for work...");
    info!("Press Ctrl+C to shutdown");

    // 4. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 5. Graceful shutdown
    daemon.shutdown().await
}
