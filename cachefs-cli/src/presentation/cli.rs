use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "cachefs devtool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a cache directory against a root capability, running the
    /// liveness scan and sweep, and exit.
    Open {
        cache_dir: PathBuf,
        remote_dir: PathBuf,
        rootcap: String,
    },

    /// Run only the liveness scan and sweep, printing a summary.
    Gc { cache_dir: PathBuf, rootcap: String },

    /// List the children of a cached directory.
    Ls {
        cache_dir: PathBuf,
        remote_dir: PathBuf,
        rootcap: String,
        #[arg(default_value = "")]
        upath: String,
    },

    /// Print bytes from a cached file to stdout.
    Cat {
        cache_dir: PathBuf,
        remote_dir: PathBuf,
        rootcap: String,
        upath: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Defaults to the rest of the file.
        #[arg(long)]
        length: Option<u64>,
    },
}
