use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for `plexscand`.
#[derive(Parser, Debug, Clone)]
#[command(name = "plexscand")]
#[command(about = "Watches media library directories and triggers partial indexer rescans")]
pub struct Args {
    /// Alternate config file path (default: /usr/local/etc/plexscand.conf)
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<PathBuf>,

    /// Log to stdout at the configured level instead of daemonizing
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Background/daemon mode: double-fork, detach, redirect std streams
    #[arg(short = 'd', long = "daemon")]
    pub daemonize: bool,

    /// Override the startup connection timeout, in seconds
    #[arg(short = 't', long = "timeout")]
    pub startup_timeout: Option<u64>,
}

pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/plexscand.conf";
