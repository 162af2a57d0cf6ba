use std::path::{Path, PathBuf};

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::{Sha256, Sha512};

use crate::config::Tunables;
use crate::error::Result;
use crate::keys::salt;
use crate::upath::UPath;

const OKM_LEN: usize = 96;
const TAG_SEPARATOR: &[u8] = b"//\x00";

/// Disambiguates the three artifacts derived for a single file path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactTag {
    State,
    Data,
}

impl ArtifactTag {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            ArtifactTag::State => b"state",
            ArtifactTag::Data => b"data",
        }
    }
}

/// Derives per-artifact on-disk names and encryption keys from a rootcap
/// and a persisted salt. Two `KeySchedule`s opened with the same rootcap
/// against the same cache directory always derive identical names and
/// keys for the same logical path.
pub struct KeySchedule {
    cache_dir: PathBuf,
    hk: Hkdf<Sha256>,
}

impl KeySchedule {
    pub fn open(cache_dir: &Path, rootcap: &str, tunables: &Tunables) -> Result<Self> {
        let salt = salt::open_or_create(cache_dir)?;
        let (salt_pbkdf, salt_hkdf) = salt.split_at(32);

        let mut master_key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            rootcap.as_bytes(),
            salt_pbkdf,
            tunables.pbkdf2_iterations,
            &mut master_key,
        );

        let hk = Hkdf::<Sha256>::new(Some(salt_hkdf), &master_key);

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            hk,
        })
    }

    /// Derive the on-disk path and 32-byte AEAD key for `upath`, optionally
    /// tagged to select the state or data artifact of a file rather than
    /// its node-info artifact.
    pub fn derive(&self, upath: &UPath, tag: Option<ArtifactTag>) -> (PathBuf, [u8; 32]) {
        let mut info = upath.as_str().as_bytes().to_vec();
        if let Some(tag) = tag {
            info.extend_from_slice(TAG_SEPARATOR);
            info.extend_from_slice(tag.as_bytes());
        }

        let mut okm = [0u8; OKM_LEN];
        self.hk
            .expand(&info, &mut okm)
            .expect("96-byte OKM is within HKDF-SHA256's output limit");

        let mut key = [0u8; 32];
        key.copy_from_slice(&okm[0..32]);
        let mac_key = &okm[32..64];

        let mut mac =
            Hmac::<Sha512>::new_from_slice(mac_key).expect("HMAC accepts keys of any length");
        mac.update(&info);
        let basename = hex::encode(mac.finalize().into_bytes());

        (self.cache_dir.join(basename), key)
    }
}
