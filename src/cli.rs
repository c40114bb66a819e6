//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch media variants under a delivery size ceiling with live progress.
///
/// Reads one command per line from stdin: a media link lists the available
/// formats, `/download_<id>` fetches one, `/cancel` stops a running download.
#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to a config file (defaults to $XDG_CONFIG_HOME/mediafetch/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum deliverable file size in megabytes (1-4096)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=4096))]
    pub ceiling_mb: Option<u64>,

    /// Directory for in-progress downloads
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Directory that receives delivered files
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// yt-dlp executable to run
    #[arg(long = "yt-dlp")]
    pub yt_dlp: Option<String>,

    /// Maximum concurrent downloads (1-32)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub max_downloads: Option<u8>,

    /// Requester identity used for the console session
    #[arg(long, default_value = "local")]
    pub requester: String,
}
