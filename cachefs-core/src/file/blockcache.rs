use std::ops::Range;

use crate::error::{CacheError, Result};
use crate::store::encfile::EncryptedFile;

/// Tracks which byte ranges of a fixed-size backing file already hold
/// fetched content, as a sorted list of disjoint, maximally-merged
/// half-open ranges.
pub struct BlockCache {
    backend: EncryptedFile,
    total_len: u64,
    resident: Vec<Range<u64>>,
}

impl BlockCache {
    /// Wrap a freshly created backend of `total_len` bytes with no
    /// resident content.
    pub fn new(backend: EncryptedFile, total_len: u64) -> Self {
        Self {
            backend,
            total_len,
            resident: Vec::new(),
        }
    }

    /// Restore residency from a previously saved state file.
    pub fn restore(backend: EncryptedFile, state_backend: &mut EncryptedFile) -> Result<Self> {
        let total_len = backend.len();
        let mut bytes = vec![0u8; state_backend.len() as usize];
        state_backend.read_exact_at(0, &mut bytes)?;
        let resident = decode_residency(&bytes, total_len)?;
        Ok(Self {
            backend,
            total_len,
            resident,
        })
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn resident_ranges(&self) -> &[Range<u64>] {
        &self.resident
    }

    fn covers(&self, offset: u64, len: u64) -> bool {
        if len == 0 {
            return true;
        }
        let end = offset + len;
        self.resident.iter().any(|r| r.start <= offset && r.end >= end)
    }

    /// If `[offset, offset+len)` is already fully resident, `None`.
    /// Otherwise a contiguous range the caller should fetch and feed back
    /// through [`BlockCache::receive_cached_data`] or
    /// [`BlockCache::write`]. The range is chosen by the cache; callers
    /// must not assume it equals the requested range.
    pub fn pre_read(&self, offset: u64, len: u64) -> Option<(u64, u64)> {
        if len == 0 || self.covers(offset, len) {
            return None;
        }
        let end = offset + len;
        let mut cursor = offset;
        for r in &self.resident {
            if r.start > cursor {
                break;
            }
            if r.end > cursor {
                cursor = r.end;
            }
            if cursor >= end {
                break;
            }
        }
        if cursor >= end {
            None
        } else {
            Some((cursor, end - cursor))
        }
    }

    pub fn pre_write(&self, offset: u64, len: u64) -> Option<(u64, u64)> {
        self.pre_read(offset, len)
    }

    /// Drop `range` from residency without touching the backend, so the
    /// next `pre_read`/`pre_write` over it reports a gap again. Used when
    /// a resident block turns out not to decrypt: the bytes on disk are
    /// unusable, but the range is otherwise ordinary and worth refetching
    /// rather than failing the whole read.
    pub fn invalidate(&mut self, range: Range<u64>) {
        if range.start >= range.end {
            return;
        }
        let mut out = Vec::with_capacity(self.resident.len());
        for r in self.resident.drain(..) {
            if r.end <= range.start || r.start >= range.end {
                out.push(r);
                continue;
            }
            if r.start < range.start {
                out.push(r.start..range.start);
            }
            if r.end > range.end {
                out.push(range.end..r.end);
            }
        }
        out.sort_by_key(|r| r.start);
        self.resident = out;
    }

    /// Read an already-resident range from the backend.
    pub fn read(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.backend.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Write `data` into the backend and mark it resident.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<u64> {
        self.backend.write_all_at(offset, data)?;
        self.insert(offset..offset + data.len() as u64);
        Ok(data.len() as u64)
    }

    /// Absorb bytes pulled from a remote stream that was opened at
    /// `stream_offset`, returning the new stream offset and any tail that
    /// could not be absorbed (always empty for this implementation, since
    /// it has no reason to defer a write it is able to make immediately).
    pub fn receive_cached_data(
        &mut self,
        stream_offset: u64,
        chunks: Vec<Vec<u8>>,
    ) -> Result<(u64, Vec<Vec<u8>>)> {
        let mut buf = Vec::new();
        for c in chunks {
            buf.extend_from_slice(&c);
        }
        if buf.is_empty() {
            return Ok((stream_offset, Vec::new()));
        }
        let cap = self.total_len.saturating_sub(stream_offset);
        let take = std::cmp::min(cap, buf.len() as u64) as usize;
        if take > 0 {
            self.write(stream_offset, &buf[..take])?;
        }
        Ok((stream_offset + take as u64, Vec::new()))
    }

    pub fn save_state(&self, state_backend: &mut EncryptedFile) -> Result<()> {
        let bytes = encode_residency(&self.resident);
        state_backend.set_len(0)?;
        if !bytes.is_empty() {
            state_backend.write_all_at(0, &bytes)?;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.backend.sync()
    }

    fn insert(&mut self, range: Range<u64>) {
        if range.start >= range.end {
            return;
        }
        let mut merged = range;
        let mut out = Vec::with_capacity(self.resident.len() + 1);
        for r in self.resident.drain(..) {
            if r.end < merged.start || r.start > merged.end {
                out.push(r);
            } else {
                merged.start = merged.start.min(r.start);
                merged.end = merged.end.max(r.end);
            }
        }
        out.push(merged);
        out.sort_by_key(|r| r.start);
        self.resident = out;
    }
}

fn encode_residency(ranges: &[Range<u64>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + ranges.len() * 16);
    out.extend_from_slice(&(ranges.len() as u64).to_le_bytes());
    for r in ranges {
        out.extend_from_slice(&r.start.to_le_bytes());
        out.extend_from_slice(&r.end.to_le_bytes());
    }
    out
}

fn decode_residency(bytes: &[u8], total_len: u64) -> Result<Vec<Range<u64>>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < 8 {
        return Err(state_err("truncated block-cache state"));
    }
    let count = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as usize;
    let need = 8 + count * 16;
    if bytes.len() != need {
        return Err(state_err("block-cache state size mismatch"));
    }
    let mut out = Vec::with_capacity(count);
    let mut off = 8;
    for _ in 0..count {
        let start = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        let end = u64::from_le_bytes(bytes[off + 8..off + 16].try_into().unwrap());
        if start >= end || end > total_len {
            return Err(state_err("block-cache state out of bounds"));
        }
        out.push(start..end);
        off += 16;
    }
    Ok(out)
}

fn state_err(msg: &str) -> CacheError {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::encfile::OpenMode;

    fn backend(dir: &std::path::Path, name: &str, size: u64) -> EncryptedFile {
        let mut f = EncryptedFile::open(&dir.join(name), [1u8; 32], OpenMode::CreateTruncate).unwrap();
        f.create_filled_with_random(size).unwrap();
        f
    }

    #[test]
    fn pre_read_reports_gaps_and_becomes_resident_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = BlockCache::new(backend(dir.path(), "data", 100), 100);

        let gap = cache.pre_read(0, 10).unwrap();
        assert_eq!(gap, (0, 10));
        cache.write(0, &vec![1u8; 10]).unwrap();
        assert!(cache.pre_read(0, 10).is_none());
    }

    #[test]
    fn adjacent_writes_merge_into_one_resident_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = BlockCache::new(backend(dir.path(), "data", 100), 100);
        cache.write(0, &vec![0u8; 10]).unwrap();
        cache.write(10, &vec![0u8; 10]).unwrap();
        assert_eq!(cache.resident_ranges(), &[0..20]);
    }

    #[test]
    fn save_and_restore_round_trips_residency() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = EncryptedFile::open(&dir.path().join("state"), [2u8; 32], OpenMode::CreateTruncate).unwrap();

        let mut cache = BlockCache::new(backend(dir.path(), "data", 100), 100);
        cache.write(5, &vec![9u8; 20]).unwrap();
        cache.save_state(&mut state).unwrap();

        let reopened_data =
            EncryptedFile::open(&dir.path().join("data"), [1u8; 32], OpenMode::ReadWrite).unwrap();
        let mut reopened_state =
            EncryptedFile::open(&dir.path().join("state"), [2u8; 32], OpenMode::ReadWrite).unwrap();
        let restored = BlockCache::restore(reopened_data, &mut reopened_state).unwrap();
        assert_eq!(restored.resident_ranges(), &[5..25]);
    }

    #[test]
    fn invalidate_reopens_a_gap_in_the_middle_of_a_resident_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = BlockCache::new(backend(dir.path(), "data", 100), 100);
        cache.write(0, &vec![0u8; 50]).unwrap();

        cache.invalidate(20..30);
        assert_eq!(cache.resident_ranges(), &[0..20, 30..50]);
        assert_eq!(cache.pre_read(0, 50), Some((20, 30)));
    }
}
