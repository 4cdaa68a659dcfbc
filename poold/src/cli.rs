use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "poold")]
#[command(about = "Mining pool node", long_about = None)]
pub struct Args {
    /// Path to configuration file (optional, uses defaults if not provided)
    #[arg(short, long)]
    pub config_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Coin hash algorithm (sha256d, blake3, keccak)
    #[arg(short, long)]
    pub algorithm: Option<String>,

    /// Daemon WebSocket endpoint
    #[arg(long)]
    pub daemon_url: Option<String>,

    /// Stratum listen port (enables stratum)
    #[arg(long)]
    pub stratum_port: Option<u16>,

    /// Vanilla listen port (enables vanilla)
    #[arg(long)]
    pub vanilla_port: Option<u16>,

    /// Disable the stratum front-end
    #[arg(long)]
    pub no_stratum: bool,

    /// Disable the vanilla front-end
    #[arg(long)]
    pub no_vanilla: bool,
}

pub fn parse_args() -> Args {
    Args::parse()
}
