pub mod handlers;

use cachefs_core::Result;
use clap::Parser;

use crate::presentation::cli::{Cli, Commands};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Open {
            cache_dir,
            remote_dir,
            rootcap,
        } => handlers::handle_open(cache_dir, remote_dir, rootcap),
        Commands::Gc { cache_dir, rootcap } => handlers::handle_gc(cache_dir, rootcap),
        Commands::Ls {
            cache_dir,
            remote_dir,
            rootcap,
            upath,
        } => handlers::handle_ls(cache_dir, remote_dir, rootcap, upath),
        Commands::Cat {
            cache_dir,
            remote_dir,
            rootcap,
            upath,
            offset,
            length,
        } => handlers::handle_cat(cache_dir, remote_dir, rootcap, upath, offset, length),
    }
}
