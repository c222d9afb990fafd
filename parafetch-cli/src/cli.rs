//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Download a file over HTTP using parallel range requests.
#[derive(Debug, Parser)]
#[command(name = "parafetch", version, about, long_about = None)]
pub struct Args {
    /// URL of the file to download
    pub url: String,

    /// Number of parts to split the download into [default: number of CPUs]
    #[arg(short = 'n', long, value_name = "N")]
    pub parts: Option<usize>,

    /// Copy buffer size in bytes [default: 8096]
    #[arg(short = 'b', long, value_name = "BYTES")]
    pub buffer_size: Option<usize>,

    /// Output file [default: last path segment of the URL]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Retries per request after the first attempt [default: 10]
    #[arg(short, long, value_name = "N")]
    pub retries: Option<u32>,

    /// Worker threads [default: number of CPUs]
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Per-request timeout in seconds [default: 300]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Stop all parts as soon as one fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Configuration file [default: <config dir>/parafetch/config.ini]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Store the download flags given here in the configuration file
    #[arg(long)]
    pub save_config: bool,
}
