use std::io;
use std::path::{Path, PathBuf};

use crate::config::Tunables;
use crate::dir::CachedDir;
use crate::error::Result;
use crate::file::CachedFile;
use crate::gc::{self, GcReport};
use crate::keys::schedule::KeySchedule;
use crate::remote::RemoteStore;
use crate::upath::UPath;

/// Top-level handle onto one cache directory opened against one rootcap.
/// Opening runs the liveness scan and sweep once, up front, then hands out
/// [`CachedDir`] and [`CachedFile`] views on demand.
pub struct CacheDb {
    cache_dir: PathBuf,
    schedule: KeySchedule,
    tunables: Tunables,
}

impl CacheDb {
    pub fn open(cache_dir: &Path, rootcap: &str) -> Result<Self> {
        Self::open_with_tunables(cache_dir, rootcap, Tunables::default())
    }

    pub fn open_with_tunables(cache_dir: &Path, rootcap: &str, tunables: Tunables) -> Result<Self> {
        if !cache_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "cache directory is not an existing directory",
            )
            .into());
        }

        let schedule = KeySchedule::open(cache_dir, rootcap, &tunables)?;
        let report = gc::scan_and_collect(cache_dir, &schedule)?;
        tracing::info!(?report, "cachedb: opened");

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            schedule,
            tunables,
        })
    }

    pub fn gc(&self) -> Result<GcReport> {
        gc::scan_and_collect(&self.cache_dir, &self.schedule)
    }

    pub fn open_dir(&self, upath: &UPath, io: &dyn RemoteStore) -> Result<CachedDir> {
        CachedDir::open(&self.cache_dir, &self.schedule, upath, io)
    }

    pub fn open_file(&self, upath: &UPath, io: &dyn RemoteStore) -> Result<CachedFile> {
        CachedFile::open(&self.cache_dir, &self.schedule, upath, io, self.tunables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_support::FakeStore;

    #[test]
    fn rejects_a_cache_dir_that_does_not_exist() {
        let result = CacheDb::open(Path::new("/nonexistent/path/for/sure"), "URI:ROOT:fake");
        assert!(result.is_err());
    }

    #[test]
    fn open_runs_gc_and_serves_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        store.put_dir("docs");

        let db = CacheDb::open(dir.path(), "URI:ROOT:fake").unwrap();
        let root = db.open_dir(&UPath::root(), &store).unwrap();
        assert_eq!(root.listdir(), vec!["docs".to_string()]);
    }
}
