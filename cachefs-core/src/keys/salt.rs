use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// 32 bytes for the PBKDF2 salt, 32 bytes for the HKDF-extract salt.
pub const SALT_LEN: usize = 64;

/// Load the persisted salt, generating and atomically persisting a fresh
/// one on first use or if the existing file is the wrong size.
pub fn open_or_create(cache_dir: &Path) -> Result<[u8; SALT_LEN]> {
    let path = cache_dir.join("salt");
    if let Ok(bytes) = fs::read(&path) {
        if bytes.len() == SALT_LEN {
            let mut out = [0u8; SALT_LEN];
            out.copy_from_slice(&bytes);
            return Ok(out);
        }
    }

    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    write_atomic(&path, &salt)?;
    Ok(salt)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("salt")
        .to_string();
    name.push_str(".tmp");
    path.with_file_name(name)
}
