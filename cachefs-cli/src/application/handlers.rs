use std::io::Write;
use std::path::PathBuf;

use cachefs_core::{CacheDb, RemoteStore, Result, UPath};

use crate::fsremote::FsRemoteStore;

pub fn handle_open(cache_dir: PathBuf, remote_dir: PathBuf, rootcap: String) -> Result<()> {
    let io = FsRemoteStore::new(remote_dir);
    io.get_info(&UPath::root())?;
    let db = CacheDb::open(&cache_dir, &rootcap)?;
    let report = db.gc()?;
    eprintln!(
        "opened {} (visited {} dirs, {} live artifacts, {} swept)",
        cache_dir.display(),
        report.visited_dirs,
        report.live_count,
        report.removed_count
    );
    Ok(())
}

pub fn handle_gc(cache_dir: PathBuf, rootcap: String) -> Result<()> {
    let db = CacheDb::open(&cache_dir, &rootcap)?;
    let report = db.gc()?;
    println!(
        "visited_dirs={} live={} removed={}",
        report.visited_dirs, report.live_count, report.removed_count
    );
    Ok(())
}

pub fn handle_ls(cache_dir: PathBuf, remote_dir: PathBuf, rootcap: String, upath: String) -> Result<()> {
    let io = FsRemoteStore::new(remote_dir);
    let db = CacheDb::open(&cache_dir, &rootcap)?;
    let upath = UPath::normalize(&upath)?;
    let dir = db.open_dir(&upath, &io)?;
    let mut names = dir.listdir();
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(())
}

pub fn handle_cat(
    cache_dir: PathBuf,
    remote_dir: PathBuf,
    rootcap: String,
    upath: String,
    offset: u64,
    length: Option<u64>,
) -> Result<()> {
    let io = FsRemoteStore::new(remote_dir);
    let db = CacheDb::open(&cache_dir, &rootcap)?;
    let upath = UPath::normalize(&upath)?;
    let mut file = db.open_file(&upath, &io)?;
    let length = length.unwrap_or_else(|| file.size().saturating_sub(offset));
    let bytes = file.read(&io, offset, length)?;
    file.close()?;
    std::io::stdout().write_all(&bytes)?;
    Ok(())
}
