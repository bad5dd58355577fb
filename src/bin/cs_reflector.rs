//! Channel Sounding reflector.
//!
//! Advertises, answers the peer's negotiation on every connection and
//! reports subevent results. Each link loss runs the recovery action and
//! re-arms advertising for the next initiator.

use std::path::PathBuf;

use clap::Parser;
use cs_ranging::{config::Config, host, logging, protocol::Role, VERSION};

#[derive(Parser)]
#[command(name = "cs-reflector")]
#[command(version = VERSION)]
#[command(about = "Channel Sounding reflector", long_about = None)]
struct Cli {
    /// Config file (default: $CS_RANGING_CONFIG or <config dir>/cs-ranging/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after serving this many connections
    #[arg(long)]
    sessions: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match cli.config {
        Some(path) => Config::from_file(path)?.with_env()?,
        None => Config::load()?,
    };
    if cli.sessions.is_some() {
        config.recovery.max_sessions = cli.sessions;
    }
    logging::init(&config.logging);

    tracing::info!("Starting Channel Sounding Reflector v{VERSION}");

    let ended = host::run_simulated(&config, Role::Reflector).await?;
    tracing::info!("Served {} connections", ended.len());

    Ok(())
}
