use std::path::PathBuf;

use clap::Parser;

/// Command-line flags. Anything left unset keeps the value from the config
/// file or the defaults.
#[derive(Debug, Default, Parser)]
#[command(name = "halfsync", version, about = "Half-sync/half-reactive HTTP server")]
pub struct Cli {
    /// Port to listen on
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Disable logging with 1, keep it with 0
    #[arg(short = 'l', long = "close-log", value_parser = clap::value_parser!(u8).range(0..=1))]
    pub close_log: Option<u8>,

    /// Document root
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,

    /// YAML config file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Credential handles shared by the login and registration pages
    #[arg(short = 's', long)]
    pub connections: Option<usize>,

    /// YAML file preloading registered users
    #[arg(short = 'u', long)]
    pub users: Option<PathBuf>,
}
