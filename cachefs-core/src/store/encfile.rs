use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use blake3::Hasher;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use crate::error::{CacheError, Result};

/// Plaintext bytes sealed per block.
pub const BLOCK_SIZE: u64 = 4096;
const TAG_LEN: u64 = 16;
const SEALED_BLOCK_SIZE: u64 = BLOCK_SIZE + TAG_LEN;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
    CreateTruncate,
}

/// A random-access file whose contents are transparently sealed block by
/// block with XChaCha20-Poly1305. Each block's nonce is derived from the
/// key and block index, so blocks never need a nonce stored alongside
/// them; the only on-disk state is the sequence of sealed blocks.
///
/// A failed decrypt (wrong key, truncated block, bit rot) surfaces as a
/// plain [`CacheError::Io`] with `ErrorKind::InvalidData` — callers that
/// treat any error from a warm-path open as "go cold" need no special
/// case for it.
pub struct EncryptedFile {
    f: File,
    key: [u8; 32],
    plain_len: u64,
}

fn corrupt(msg: impl Into<String>) -> CacheError {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into()).into()
}

fn block_nonce(key: &[u8; 32], block_index: u64) -> XNonce {
    let mut h = Hasher::new();
    h.update(key);
    h.update(&block_index.to_le_bytes());
    let out = h.finalize();
    *XNonce::from_slice(&out.as_bytes()[..24])
}

impl EncryptedFile {
    pub fn open(path: &Path, key: [u8; 32], mode: OpenMode) -> Result<Self> {
        let f = match mode {
            OpenMode::Read => OpenOptions::new().read(true).open(path)?,
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(path)?,
            OpenMode::CreateTruncate => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        };
        let sealed_len = f.metadata()?.len();
        let plain_len = plain_len_for(sealed_len)?;
        Ok(Self { f, key, plain_len })
    }

    pub fn len(&self) -> u64 {
        self.plain_len
    }

    pub fn is_empty(&self) -> bool {
        self.plain_len == 0
    }

    /// Grow or shrink the plaintext length. Growth is zero-filled; use
    /// [`EncryptedFile::create_filled_with_random`] on a fresh file instead
    /// when the content must start out unpredictable.
    pub fn set_len(&mut self, new_len: u64) -> Result<()> {
        if new_len == self.plain_len {
            return Ok(());
        }
        if new_len < self.plain_len {
            let sealed_blocks = new_len.div_ceil(BLOCK_SIZE);
            self.f.set_len(sealed_blocks * SEALED_BLOCK_SIZE)?;
            self.plain_len = new_len;
            return Ok(());
        }
        let zeros = vec![0u8; BLOCK_SIZE as usize];
        while self.plain_len < new_len {
            let take = std::cmp::min(BLOCK_SIZE, new_len - self.plain_len);
            self.write_all_at(self.plain_len, &zeros[..take as usize])?;
        }
        Ok(())
    }

    /// Seal `total_len` bytes of cryptographically random plaintext into a
    /// freshly truncated file, establishing its full size up front.
    pub fn create_filled_with_random(&mut self, total_len: u64) -> Result<()> {
        let mut block_index = 0u64;
        let mut remaining = total_len;
        let mut buf = vec![0u8; BLOCK_SIZE as usize];
        while remaining > 0 {
            let take = std::cmp::min(BLOCK_SIZE, remaining) as usize;
            getrandom::getrandom(&mut buf[..take])
                .map_err(|e| corrupt(format!("random fill failed: {e}")))?;
            self.write_block(block_index, &buf[..take])?;
            remaining -= take as u64;
            block_index += 1;
        }
        self.plain_len = total_len;
        Ok(())
    }

    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if offset.saturating_add(buf.len() as u64) > self.plain_len {
            return Err(corrupt("read past end of encrypted file"));
        }
        let mut written = 0usize;
        let mut block_index = offset / BLOCK_SIZE;
        let mut block_off = (offset % BLOCK_SIZE) as usize;
        while written < buf.len() {
            let plain = self.read_block(block_index)?;
            let take = std::cmp::min(plain.len() - block_off, buf.len() - written);
            buf[written..written + take].copy_from_slice(&plain[block_off..block_off + take]);
            written += take;
            block_off = 0;
            block_index += 1;
        }
        Ok(())
    }

    pub fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset + data.len() as u64;
        let mut written = 0usize;
        let mut block_index = offset / BLOCK_SIZE;
        let mut block_off = (offset % BLOCK_SIZE) as usize;
        while written < data.len() {
            let block_start = block_index * BLOCK_SIZE;
            let block_plain_len =
                std::cmp::min(BLOCK_SIZE, self.plain_len.max(end) - block_start) as usize;
            let mut plain = if block_start < self.plain_len {
                self.read_block(block_index)
                    .unwrap_or_else(|_| vec![0u8; block_plain_len])
            } else {
                vec![0u8; block_plain_len]
            };
            if plain.len() < block_plain_len {
                plain.resize(block_plain_len, 0);
            }
            let take = std::cmp::min(plain.len() - block_off, data.len() - written);
            plain[block_off..block_off + take].copy_from_slice(&data[written..written + take]);
            self.write_block(block_index, &plain)?;
            written += take;
            block_off = 0;
            block_index += 1;
        }
        if end > self.plain_len {
            self.plain_len = end;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        Ok(self.f.sync_all()?)
    }

    fn read_block(&mut self, block_index: u64) -> Result<Vec<u8>> {
        let remaining_plain = self.plain_len.saturating_sub(block_index * BLOCK_SIZE);
        if remaining_plain == 0 {
            return Err(corrupt("read past end of encrypted file"));
        }
        let plain_len = std::cmp::min(BLOCK_SIZE, remaining_plain) as usize;
        let sealed_len = plain_len + TAG_LEN as usize;
        let mut sealed = vec![0u8; sealed_len];
        self.f.seek(SeekFrom::Start(block_index * SEALED_BLOCK_SIZE))?;
        self.f.read_exact(&mut sealed)?;

        let aead = XChaCha20Poly1305::new(Key::from_slice(&self.key));
        let nonce = block_nonce(&self.key, block_index);
        aead.decrypt(
            &nonce,
            Payload {
                msg: &sealed,
                aad: &block_index.to_le_bytes(),
            },
        )
        .map_err(|_| corrupt("block authentication failed"))
    }

    fn write_block(&mut self, block_index: u64, plain: &[u8]) -> Result<()> {
        let aead = XChaCha20Poly1305::new(Key::from_slice(&self.key));
        let nonce = block_nonce(&self.key, block_index);
        let sealed = aead
            .encrypt(
                &nonce,
                Payload {
                    msg: plain,
                    aad: &block_index.to_le_bytes(),
                },
            )
            .map_err(|_| corrupt("block sealing failed"))?;
        self.f.seek(SeekFrom::Start(block_index * SEALED_BLOCK_SIZE))?;
        self.f.write_all(&sealed)?;
        Ok(())
    }
}

fn plain_len_for(sealed_len: u64) -> Result<u64> {
    if sealed_len == 0 {
        return Ok(0);
    }
    let full_blocks = sealed_len / SEALED_BLOCK_SIZE;
    let rem = sealed_len % SEALED_BLOCK_SIZE;
    if rem == 0 {
        Ok(full_blocks * BLOCK_SIZE)
    } else if rem > TAG_LEN {
        Ok(full_blocks * BLOCK_SIZE + (rem - TAG_LEN))
    } else {
        Err(corrupt("truncated encrypted file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn round_trips_unaligned_writes_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        let mut f = EncryptedFile::open(&path, key(), OpenMode::CreateTruncate).unwrap();

        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        f.write_all_at(17, &data).unwrap();
        assert_eq!(f.len(), 17 + data.len() as u64);

        let mut back = vec![0u8; data.len()];
        f.read_exact_at(17, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        {
            let mut f = EncryptedFile::open(&path, key(), OpenMode::CreateTruncate).unwrap();
            f.write_all_at(0, b"hello world").unwrap();
        }
        let mut other = EncryptedFile::open(&path, [9u8; 32], OpenMode::Read).unwrap();
        let mut buf = [0u8; 11];
        assert!(other.read_exact_at(0, &mut buf).is_err());
    }

    #[test]
    fn create_filled_with_random_establishes_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        let mut f = EncryptedFile::open(&path, key(), OpenMode::CreateTruncate).unwrap();
        f.create_filled_with_random(9_000).unwrap();
        assert_eq!(f.len(), 9_000);

        let mut buf = vec![0u8; 9_000];
        f.read_exact_at(0, &mut buf).unwrap();
    }

    #[test]
    fn reopen_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        {
            let mut f = EncryptedFile::open(&path, key(), OpenMode::CreateTruncate).unwrap();
            f.write_all_at(0, b"persisted").unwrap();
            f.sync().unwrap();
        }
        let mut f = EncryptedFile::open(&path, key(), OpenMode::Read).unwrap();
        let mut buf = [0u8; 9];
        f.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"persisted");
    }
}
