use std::io::Read;
use std::path::Path;

use crate::config::Tunables;
use crate::error::{CacheError, Result};
use crate::file::blockcache::BlockCache;
use crate::keys::schedule::{ArtifactTag, KeySchedule};
use crate::node::NodeInfo;
use crate::remote::{ContentStream, RemoteStore};
use crate::store::artifact::ArtifactRef;
use crate::store::encfile::{EncryptedFile, OpenMode};
use crate::upath::UPath;

/// FUSE-style hints a filesystem layer built on top of this cache would
/// report for open files; `CachedFile` itself does no I/O scheduling
/// based on them.
pub struct FileFlags {
    pub direct_io: bool,
    pub keep_cache: bool,
}

pub const FILE_FLAGS: FileFlags = FileFlags {
    direct_io: false,
    keep_cache: false,
};

/// An open cached view of a single remote file: its node info, a
/// block-level residency cache over a local data blob, and persisted
/// residency state so a warm reopen need not refetch anything already
/// pulled down.
pub struct CachedFile {
    upath: UPath,
    info: NodeInfo,
    f_info: EncryptedFile,
    cache: BlockCache,
    f_state: EncryptedFile,
    tunables: Tunables,
}

fn json_err(e: serde_json::Error) -> CacheError {
    CacheError::Format(e.to_string())
}

impl CachedFile {
    pub fn open(
        cache_dir: &Path,
        schedule: &KeySchedule,
        upath: &UPath,
        io: &dyn RemoteStore,
        tunables: Tunables,
    ) -> Result<Self> {
        let info_artifact = ArtifactRef::derive(schedule, upath, None);
        let state_artifact = ArtifactRef::derive(schedule, upath, Some(ArtifactTag::State));
        let data_artifact = ArtifactRef::derive(schedule, upath, Some(ArtifactTag::Data));

        if let Some(cf) = Self::try_open_warm(upath, &info_artifact, &state_artifact, &data_artifact, tunables)
        {
            tracing::debug!(upath = %upath, "cachedfile: warm hit");
            return Ok(cf);
        }

        tracing::debug!(upath = %upath, "cachedfile: cold path");
        Self::open_cold(upath, io, &info_artifact, &state_artifact, &data_artifact, tunables)
    }

    fn try_open_warm(
        upath: &UPath,
        info_artifact: &ArtifactRef,
        state_artifact: &ArtifactRef,
        data_artifact: &ArtifactRef,
        tunables: Tunables,
    ) -> Option<Self> {
        let mut f_info = EncryptedFile::open(&info_artifact.path, info_artifact.key, OpenMode::Read).ok()?;
        let mut bytes = vec![0u8; f_info.len() as usize];
        f_info.read_exact_at(0, &mut bytes).ok()?;
        let info: NodeInfo = serde_json::from_slice(&bytes).ok()?;
        if !info.is_file() {
            return None;
        }

        let mut f_state =
            EncryptedFile::open(&state_artifact.path, state_artifact.key, OpenMode::ReadWrite).ok()?;
        let f_data =
            EncryptedFile::open(&data_artifact.path, data_artifact.key, OpenMode::ReadWrite).ok()?;
        let cache = BlockCache::restore(f_data, &mut f_state).ok()?;

        Some(Self {
            upath: upath.clone(),
            info,
            f_info,
            cache,
            f_state,
            tunables,
        })
    }

    fn open_cold(
        upath: &UPath,
        io: &dyn RemoteStore,
        info_artifact: &ArtifactRef,
        state_artifact: &ArtifactRef,
        data_artifact: &ArtifactRef,
        tunables: Tunables,
    ) -> Result<Self> {
        let mut f_info = EncryptedFile::open(&info_artifact.path, info_artifact.key, OpenMode::CreateTruncate)?;
        let info = match io.get_info(upath) {
            Ok(info) => info,
            Err(e) => {
                let _ = std::fs::remove_file(&info_artifact.path);
                return Err(e);
            }
        };
        if !info.is_file() {
            let _ = std::fs::remove_file(&info_artifact.path);
            return Err(CacheError::BadEntry {
                upath: upath.as_str().to_string(),
                child: String::new(),
            });
        }

        let bytes = serde_json::to_vec(&info).map_err(json_err)?;
        f_info.write_all_at(0, &bytes)?;
        f_info.sync()?;

        let size = info.size().ok_or_else(|| CacheError::BadEntry {
            upath: upath.as_str().to_string(),
            child: String::new(),
        })?;

        let mut f_data = EncryptedFile::open(&data_artifact.path, data_artifact.key, OpenMode::CreateTruncate)?;
        f_data.create_filled_with_random(size)?;
        let cache = BlockCache::new(f_data, size);

        let f_state = EncryptedFile::open(&state_artifact.path, state_artifact.key, OpenMode::CreateTruncate)?;

        Ok(Self {
            upath: upath.clone(),
            info,
            f_info,
            cache,
            f_state,
            tunables,
        })
    }

    pub fn upath(&self) -> &UPath {
        &self.upath
    }

    pub fn size(&self) -> u64 {
        self.cache.total_len()
    }

    pub fn get_attr(&self) -> serde_json::Value {
        serde_json::json!({"type": "file", "size": self.size()})
    }

    /// Read `length` bytes starting at `offset`, pulling from the remote
    /// store through a single forward-streaming connection wherever the
    /// local cache is missing content. The read is clamped to the file's
    /// size; reading past EOF returns fewer bytes rather than erroring.
    pub fn read(&mut self, io: &dyn RemoteStore, offset: u64, length: u64) -> Result<Vec<u8>> {
        let end = std::cmp::min(offset.saturating_add(length), self.size());
        let length = end.saturating_sub(offset);
        if length == 0 {
            return Ok(Vec::new());
        }

        let ro_uri = self.info.ro_uri().unwrap_or_default().to_string();
        let mut stream: Option<(Box<dyn ContentStream>, u64)> = None;

        loop {
            let Some((c_offset, c_length)) = self.cache.pre_read(offset, length) else {
                match self.cache.read(offset, length) {
                    Ok(bytes) => return Ok(bytes),
                    Err(_) => {
                        // Marked resident but won't decrypt: the on-disk
                        // block is corrupt. Drop it and loop back through
                        // pre_read, which will report it as a gap again.
                        tracing::warn!(upath = %self.upath, offset, length, "cachedfile: resident block failed to decrypt, refetching");
                        self.cache.invalidate(offset..end);
                        continue;
                    }
                }
            };

            if let Some((_, stream_offset)) = &stream {
                let too_far_back = c_offset < *stream_offset;
                let too_far_forward =
                    c_offset > stream_offset.saturating_add(self.tunables.stream_forward_skip_bytes);
                if too_far_back || too_far_forward {
                    stream = None;
                }
            }

            if stream.is_none() {
                let s = io.get_content(&ro_uri, c_offset, c_length)?;
                stream = Some((s, c_offset));
            }

            let target = c_offset + c_length;
            let mut buf = vec![0u8; self.tunables.stream_pull_chunk_bytes];
            loop {
                let (s, stream_offset) = stream.as_mut().expect("stream opened just above");
                if *stream_offset >= target {
                    break;
                }
                let want = std::cmp::min(buf.len() as u64, target - *stream_offset) as usize;
                let n = s.read(&mut buf[..want])?;
                if n == 0 {
                    // remote closed early: fall back to re-querying residency
                    stream = None;
                    break;
                }
                let chunk = buf[..n].to_vec();
                let pulled_from = *stream_offset;
                let (new_offset, _leftover) = self.cache.receive_cached_data(pulled_from, vec![chunk])?;
                if let Some((_, so)) = stream.as_mut() {
                    *so = new_offset;
                }
            }
        }
    }

    /// Flush residency state to disk and release all handles, in the same
    /// order each time: state file truncated and rewritten, then the
    /// block cache (which owns the data file), then the info file.
    pub fn close(mut self) -> Result<()> {
        self.f_state.set_len(0)?;
        self.cache.save_state(&mut self.f_state)?;
        self.f_state.sync()?;
        drop(self.f_state);
        self.cache.close()?;
        self.f_info.sync()?;
        drop(self.f_info);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_support::FakeStore;

    fn open_file(dir: &Path, store: &FakeStore, path: &str) -> CachedFile {
        let schedule = KeySchedule::open(dir, "URI:ROOT:fake", &Tunables::default()).unwrap();
        let upath = UPath::normalize(path).unwrap();
        CachedFile::open(dir, &schedule, &upath, store, Tunables::default()).unwrap()
    }

    #[test]
    fn cold_read_fetches_whole_missing_range_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        store.put_file("doc.txt", b"hello, cached world");

        let mut f = open_file(dir.path(), &store, "doc.txt");
        let out = f.read(&store, 0, 5).unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(store.fetch_log.lock().unwrap().len(), 1);
    }

    #[test]
    fn warm_reread_does_not_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        store.put_file("doc.txt", b"hello, cached world");

        let mut f = open_file(dir.path(), &store, "doc.txt");
        f.read(&store, 0, 20).unwrap();
        f.close().unwrap();

        let mut f2 = open_file(dir.path(), &store, "doc.txt");
        let fetches_before = store.fetch_log.lock().unwrap().len();
        let out = f2.read(&store, 0, 20).unwrap();
        assert_eq!(out, b"hello, cached world");
        assert_eq!(store.fetch_log.lock().unwrap().len(), fetches_before);
    }

    #[test]
    fn disjoint_reads_trigger_two_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        let content = vec![0u8; 1_048_576];
        store.put_file("big.bin", &content);

        let mut f = open_file(dir.path(), &store, "big.bin");
        f.read(&store, 0, 4096).unwrap();
        f.read(&store, 1_048_576 - 4096, 4096).unwrap();
        assert_eq!(store.fetch_log.lock().unwrap().len(), 2);
    }

    #[test]
    fn read_past_eof_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        store.put_file("doc.txt", b"short");

        let mut f = open_file(dir.path(), &store, "doc.txt");
        let out = f.read(&store, 2, 1000).unwrap();
        assert_eq!(out, b"ort");
    }

    #[test]
    fn corrupt_data_artifact_forces_rebuild_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        store.put_file("doc.txt", b"hello, cached world");

        let schedule = KeySchedule::open(dir.path(), "URI:ROOT:fake", &Tunables::default()).unwrap();
        let upath = UPath::normalize("doc.txt").unwrap();

        let mut f = CachedFile::open(dir.path(), &schedule, &upath, &store, Tunables::default()).unwrap();
        assert_eq!(f.read(&store, 0, 5).unwrap(), b"hello");
        f.close().unwrap();
        let fetches_before = store.fetch_log.lock().unwrap().len();

        let data_artifact = ArtifactRef::derive(&schedule, &upath, Some(ArtifactTag::Data));
        let zeros = vec![0u8; std::fs::metadata(&data_artifact.path).unwrap().len() as usize];
        std::fs::write(&data_artifact.path, &zeros).unwrap();

        let mut f2 = CachedFile::open(dir.path(), &schedule, &upath, &store, Tunables::default()).unwrap();
        let out = f2.read(&store, 0, 5).unwrap();
        assert_eq!(out, b"hello");
        assert!(store.fetch_log.lock().unwrap().len() > fetches_before);

        f2.close().unwrap();
        let mut f3 = CachedFile::open(dir.path(), &schedule, &upath, &store, Tunables::default()).unwrap();
        let fetches_before_warm = store.fetch_log.lock().unwrap().len();
        assert_eq!(f3.read(&store, 0, 5).unwrap(), b"hello");
        assert_eq!(store.fetch_log.lock().unwrap().len(), fetches_before_warm);
    }
}
