use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::keys::schedule::{ArtifactTag, KeySchedule};
use crate::node::{entry_kind, NodeInfo};
use crate::store::artifact::ArtifactRef;
use crate::store::encfile::{EncryptedFile, OpenMode};
use crate::upath::UPath;

/// Summary of a single liveness scan and sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct GcReport {
    pub visited_dirs: u64,
    pub live_count: u64,
    pub removed_count: u64,
}

/// Walk the directory tree reachable from the root artifact, then delete
/// every on-disk artifact that walk did not mark live. A directory
/// artifact that fails to open or decode as a `dirnode` is treated as
/// unreachable rather than aborting the scan: its subtree is pruned
/// rather than trusted, and the artifact itself falls out of the live
/// set and is collected on this pass.
pub fn scan_and_collect(cache_dir: &Path, schedule: &KeySchedule) -> Result<GcReport> {
    let mut live: HashSet<String> = HashSet::new();
    let mut stack: Vec<UPath> = Vec::new();
    let mut report = GcReport::default();

    let root = UPath::root();
    if ArtifactRef::derive(schedule, &root, None).exists() {
        stack.push(root);
    }

    while let Some(upath) = stack.pop() {
        let artifact = ArtifactRef::derive(schedule, &upath, None);
        if !artifact.exists() {
            continue;
        }
        let info = match read_dirnode(&artifact) {
            Some(info) => info,
            None => continue,
        };
        report.visited_dirs += 1;
        live.insert(artifact.basename());

        let children = info.children().cloned().unwrap_or_default();
        for (childname, child_entry) in children {
            let c_upath = upath.child(&childname);
            match entry_kind(&child_entry) {
                Some("dirnode") => {
                    let c_artifact = ArtifactRef::derive(schedule, &c_upath, None);
                    if c_artifact.exists() {
                        stack.push(c_upath);
                    }
                }
                Some("filenode") => {
                    for tag in [None, Some(ArtifactTag::State), Some(ArtifactTag::Data)] {
                        live.insert(ArtifactRef::derive(schedule, &c_upath, tag).basename());
                    }
                }
                _ => {}
            }
        }
    }

    report.live_count = live.len() as u64;

    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "salt" {
            continue;
        }
        if !live.contains(&name) && fs::remove_file(entry.path()).is_ok() {
            report.removed_count += 1;
        }
    }

    tracing::info!(
        visited = report.visited_dirs,
        live = report.live_count,
        removed = report.removed_count,
        "gc: sweep complete"
    );
    Ok(report)
}

fn read_dirnode(artifact: &ArtifactRef) -> Option<NodeInfo> {
    let mut f = EncryptedFile::open(&artifact.path, artifact.key, OpenMode::Read).ok()?;
    let mut bytes = vec![0u8; f.len() as usize];
    f.read_exact_at(0, &mut bytes).ok()?;
    let info: NodeInfo = serde_json::from_slice(&bytes).ok()?;
    info.is_dir().then_some(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tunables;
    use crate::dir::CachedDir;
    use crate::file::CachedFile;
    use crate::remote::test_support::FakeStore;

    #[test]
    fn orphaned_artifacts_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let schedule = KeySchedule::open(dir.path(), "URI:ROOT:fake", &Tunables::default()).unwrap();
        let store = FakeStore::new();
        store.put_dir("docs");
        store.put_file("docs/a.txt", b"alive");

        let root = UPath::root();
        CachedDir::open(dir.path(), &schedule, &root, &store).unwrap();
        let docs = UPath::normalize("docs").unwrap();
        CachedDir::open(dir.path(), &schedule, &docs, &store).unwrap();
        let a = UPath::normalize("docs/a.txt").unwrap();
        let mut f = CachedFile::open(dir.path(), &schedule, &a, &store, Tunables::default()).unwrap();
        f.read(&store, 0, 5).unwrap();
        f.close().unwrap();

        // Orphan: a file artifact for a path the tree no longer references.
        let orphan = UPath::normalize("docs/gone.txt").unwrap();
        let orphan_artifact = ArtifactRef::derive(&schedule, &orphan, None);
        std::fs::write(&orphan_artifact.path, b"junk").unwrap();

        let report = scan_and_collect(dir.path(), &schedule).unwrap();
        assert!(report.removed_count >= 1);
        assert!(!orphan_artifact.path.exists());

        let docs_artifact = ArtifactRef::derive(&schedule, &docs, None);
        assert!(docs_artifact.exists());
    }

    #[test]
    fn no_root_artifact_means_nothing_survives_scan() {
        let dir = tempfile::tempdir().unwrap();
        let schedule = KeySchedule::open(dir.path(), "URI:ROOT:fake", &Tunables::default()).unwrap();
        std::fs::write(dir.path().join("stray"), b"junk").unwrap();

        let report = scan_and_collect(dir.path(), &schedule).unwrap();
        assert_eq!(report.visited_dirs, 0);
        assert_eq!(report.removed_count, 1);
    }
}
