use std::path::PathBuf;

use crate::keys::schedule::{ArtifactTag, KeySchedule};
use crate::upath::UPath;

/// A derived on-disk location and key, ready to be opened with
/// [`crate::store::encfile::EncryptedFile`].
#[derive(Clone, Debug)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub key: [u8; 32],
}

impl ArtifactRef {
    pub fn derive(schedule: &KeySchedule, upath: &UPath, tag: Option<ArtifactTag>) -> Self {
        let (path, key) = schedule.derive(upath, tag);
        Self { path, key }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
