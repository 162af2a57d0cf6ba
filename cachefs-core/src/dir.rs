use std::path::Path;

use crate::error::{CacheError, Result};
use crate::keys::schedule::KeySchedule;
use crate::node::{entry_kind, entry_linkcrtime, entry_size, NodeInfo};
use crate::remote::RemoteStore;
use crate::store::artifact::ArtifactRef;
use crate::store::encfile::{EncryptedFile, OpenMode};
use crate::upath::UPath;

fn json_err(e: serde_json::Error) -> CacheError {
    CacheError::Format(e.to_string())
}

/// A cached view of a single remote directory's listing and per-child
/// attributes. Unlike [`crate::file::CachedFile`], a directory's node
/// info is the entire cached artifact — there is no separate data or
/// state file.
pub struct CachedDir {
    upath: UPath,
    info: NodeInfo,
}

impl CachedDir {
    pub fn open(cache_dir: &Path, schedule: &KeySchedule, upath: &UPath, io: &dyn RemoteStore) -> Result<Self> {
        let artifact = ArtifactRef::derive(schedule, upath, None);

        if let Some(info) = Self::try_read_warm(&artifact) {
            tracing::debug!(upath = %upath, "cacheddir: warm hit");
            return Ok(Self {
                upath: upath.clone(),
                info,
            });
        }

        tracing::debug!(upath = %upath, "cacheddir: cold path");
        let mut f = EncryptedFile::open(&artifact.path, artifact.key, OpenMode::CreateTruncate)?;
        let info = match io.get_info(upath) {
            Ok(info) => info,
            Err(e) => {
                let _ = std::fs::remove_file(&artifact.path);
                return Err(e);
            }
        };
        if !info.is_dir() {
            let _ = std::fs::remove_file(&artifact.path);
            return Err(CacheError::BadEntry {
                upath: upath.as_str().to_string(),
                child: String::new(),
            });
        }

        let bytes = serde_json::to_vec(&info).map_err(json_err)?;
        f.write_all_at(0, &bytes)?;
        f.sync()?;

        Ok(Self {
            upath: upath.clone(),
            info,
        })
    }

    fn try_read_warm(artifact: &ArtifactRef) -> Option<NodeInfo> {
        let mut f = EncryptedFile::open(&artifact.path, artifact.key, OpenMode::Read).ok()?;
        let mut bytes = vec![0u8; f.len() as usize];
        f.read_exact_at(0, &mut bytes).ok()?;
        let info: NodeInfo = serde_json::from_slice(&bytes).ok()?;
        info.is_dir().then_some(info)
    }

    pub fn upath(&self) -> &UPath {
        &self.upath
    }

    pub fn listdir(&self) -> Vec<String> {
        self.info
            .children()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_attr(&self) -> serde_json::Value {
        serde_json::json!({"type": "dir"})
    }

    pub fn get_child_attr(&self, childname: &str) -> Result<serde_json::Value> {
        let children = self.info.children().ok_or_else(|| CacheError::BadEntry {
            upath: self.upath.as_str().to_string(),
            child: childname.to_string(),
        })?;
        let entry = children.get(childname).ok_or_else(|| CacheError::NotFound {
            upath: self.upath.child(childname).as_str().to_string(),
        })?;

        let linkcrtime = entry_linkcrtime(entry).cloned().unwrap_or(serde_json::Value::Null);
        match entry_kind(entry) {
            Some("dirnode") => Ok(serde_json::json!({
                "type": "dir",
                "ctime": linkcrtime,
                "mtime": linkcrtime,
            })),
            Some("filenode") => {
                let size = entry_size(entry).cloned().ok_or_else(|| CacheError::BadEntry {
                    upath: self.upath.as_str().to_string(),
                    child: childname.to_string(),
                })?;
                Ok(serde_json::json!({
                    "type": "file",
                    "size": size,
                    "ctime": linkcrtime,
                    "mtime": linkcrtime,
                }))
            }
            _ => Err(CacheError::BadEntry {
                upath: self.upath.as_str().to_string(),
                child: childname.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tunables;
    use crate::remote::test_support::FakeStore;

    fn schedule(dir: &Path) -> KeySchedule {
        KeySchedule::open(dir, "URI:ROOT:fake", &Tunables::default()).unwrap()
    }

    #[test]
    fn lists_children_and_reads_attrs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        store.put_dir("photos");
        store.put_file("photos/a.jpg", b"jpegbytes");

        let schedule = schedule(dir.path());
        let root = UPath::root();
        let cd = CachedDir::open(dir.path(), &schedule, &root, &store).unwrap();
        assert_eq!(cd.listdir(), vec!["photos".to_string()]);

        let attr = cd.get_child_attr("photos").unwrap();
        assert_eq!(attr["type"], "dir");
    }

    #[test]
    fn missing_child_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        let schedule = schedule(dir.path());
        let root = UPath::root();
        let cd = CachedDir::open(dir.path(), &schedule, &root, &store).unwrap();
        assert!(matches!(
            cd.get_child_attr("nope"),
            Err(CacheError::NotFound { .. })
        ));
    }

    #[test]
    fn warm_reopen_does_not_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        store.put_dir("docs");
        let schedule = schedule(dir.path());
        let root = UPath::root();
        CachedDir::open(dir.path(), &schedule, &root, &store).unwrap();

        // Second open with an empty store would fail to fetch if it went cold.
        let empty_store = FakeStore::new();
        let cd = CachedDir::open(dir.path(), &schedule, &root, &empty_store).unwrap();
        assert_eq!(cd.listdir(), vec!["docs".to_string()]);
    }
}
