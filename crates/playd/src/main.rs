//! playd: a network-controllable audio player.
//!
//! Clients connect over TCP and send one command per line (`load`, `play`,
//! `stop`, `seek`, `eject`, `dump`, `quit`). Each command gets one reply line
//! (`OK`, `WHAT` or `FAIL`); state changes and periodic positions are
//! broadcast to every client (`FILE`, `STATE`, `POS`, `LEN`, `END`).

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use playd::cli::Args;
use playd::config::{DaemonConfig, FileConfig};
use playd::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,playd=info,playd_engine=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = match args.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = DaemonConfig::resolve(&args, &file)?;
    runtime::run(config, true)
}
