//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Manage pausable HTTP and video downloads.
///
/// Jobs are kept in a local database. Only `run` transfers data: it starts or
/// resumes the given jobs (every paused job when none are given) and waits
/// until they finish. The other commands change job state and exit.
#[derive(Parser, Debug)]
#[command(name = "dlm")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Database file (default: <data dir>/download-manager/downloads.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Settings file (default: <config dir>/download-manager/settings.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Add a direct download
    Add {
        url: String,
        /// Save directory (default: settings `default_save_path`)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Add a download handled by the external extractor
    AddVideo {
        url: String,
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Title used for the file name (default: probed from the URL)
        #[arg(short, long)]
        title: Option<String>,
        /// Format hint passed to the extractor
        #[arg(short, long, default_value = "")]
        format: String,
    },

    /// List all jobs
    List,

    /// Mark pending jobs as started; `run` picks them up as paused
    Start {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Pause downloading jobs
    Pause {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Resume paused or failed jobs
    Resume {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Cancel jobs back to pending
    Cancel {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Remove jobs
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Start or resume the given jobs (default: all paused) and transfer them
    Run { ids: Vec<i64> },

    /// Show or set the speed limit in KB/s (0 = unlimited)
    SpeedLimit { kbps: Option<u64> },

    /// Show video metadata from the external extractor
    Info { url: String },
}
