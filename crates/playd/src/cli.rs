use std::path::PathBuf;

use clap::Parser;

/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "playd", version, about = "Network-controllable audio player")]
pub struct Args {
    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Output device: an index from --list-devices, or a name substring
    #[arg(long)]
    pub device: Option<String>,

    /// Address to accept control connections on [default: 0.0.0.0:1350]
    #[arg(long)]
    pub bind: Option<String>,

    /// TOML config file with the same keys as these flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Position report period while playing, in microseconds [default: 500000]
    #[arg(long)]
    pub position_period_us: Option<u64>,

    /// Frames decoded per pump step and requested per device callback [default: 2048]
    #[arg(long)]
    pub chunk_frames: Option<usize>,

    /// Ring buffer size in chunks (higher => more latency, fewer underruns) [default: 8]
    #[arg(long)]
    pub ring_chunks: Option<usize>,

    /// Control loop tick in milliseconds [default: 10]
    #[arg(long)]
    pub tick_ms: Option<u64>,
}
