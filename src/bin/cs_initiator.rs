//! Channel Sounding initiator.
//!
//! Scans for a reflector, negotiates a ranging session and reports subevent
//! results until the link drops. After link loss the configured recovery
//! action runs and a fresh session is started.

use std::path::PathBuf;

use clap::Parser;
use cs_ranging::{config::Config, host, logging, protocol::Role, VERSION};

#[derive(Parser)]
#[command(name = "cs-initiator")]
#[command(version = VERSION)]
#[command(about = "Channel Sounding initiator", long_about = None)]
struct Cli {
    /// Config file (default: $CS_RANGING_CONFIG or <config dir>/cs-ranging/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::from_file(path)?.with_env()?,
        None => Config::load()?,
    };
    logging::init(&config.logging);

    tracing::info!("Starting Channel Sounding Initiator v{VERSION}");

    let runtime = tokio::runtime::Runtime::new()?;
    let ended = runtime.block_on(host::run_simulated(&config, Role::Initiator))?;
    for end in &ended {
        tracing::info!(
            session = %end.summary.session_id,
            state = ?end.summary.state,
            "Session ended (reason {})",
            end.reason
        );
    }

    Ok(())
}
