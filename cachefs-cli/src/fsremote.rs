use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use cachefs_core::{CacheError, ContentStream, NodeInfo, RemoteStore, Result, UPath};

/// Stands in for a real remote content-addressed object store by
/// treating a local directory tree as the remote: directories are
/// directories, files are files, and a file's capability is just its
/// path relative to that root. Useful for exercising the cache against
/// real bytes without a network dependency.
pub struct FsRemoteStore {
    root: PathBuf,
}

impl FsRemoteStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn local_path(&self, upath: &UPath) -> PathBuf {
        if upath.is_root() {
            self.root.clone()
        } else {
            self.root.join(upath.as_str())
        }
    }
}

fn fetch_err(e: impl std::fmt::Display) -> CacheError {
    CacheError::Fetch(e.to_string())
}

fn mtime_secs(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl RemoteStore for FsRemoteStore {
    fn get_info(&self, upath: &UPath) -> Result<NodeInfo> {
        let p = self.local_path(upath);
        let meta = fs::metadata(&p).map_err(fetch_err)?;

        if meta.is_dir() {
            let mut children = serde_json::Map::new();
            for entry in fs::read_dir(&p).map_err(fetch_err)? {
                let entry = entry.map_err(fetch_err)?;
                let name = entry.file_name().to_string_lossy().to_string();
                let child_meta = entry.metadata().map_err(fetch_err)?;
                let linkcrtime = mtime_secs(&child_meta);
                let summary = if child_meta.is_dir() {
                    serde_json::json!(["dirnode", {"metadata": {"tahoe": {"linkcrtime": linkcrtime}}}])
                } else {
                    serde_json::json!([
                        "filenode",
                        {"size": child_meta.len(), "metadata": {"tahoe": {"linkcrtime": linkcrtime}}}
                    ])
                };
                children.insert(name, summary);
            }
            Ok(NodeInfo("dirnode".to_string(), serde_json::json!({"children": children})))
        } else {
            Ok(NodeInfo(
                "filenode".to_string(),
                serde_json::json!({
                    "size": meta.len(),
                    "ro_uri": upath.as_str(),
                    "metadata": {"tahoe": {"linkcrtime": mtime_secs(&meta)}},
                }),
            ))
        }
    }

    fn get_content(&self, cap: &str, offset: u64, length: u64) -> Result<Box<dyn ContentStream>> {
        let p = self.root.join(cap);
        let mut f = fs::File::open(&p).map_err(fetch_err)?;
        f.seek(SeekFrom::Start(offset)).map_err(fetch_err)?;
        Ok(Box::new(f.take(length)))
    }
}
