//! Filesystem layout for evidence snapshots (spec §4.3).

mod sqlite_copy;
mod zip_snapshot;

pub use sqlite_copy::{safe_copy_sqlite, CopiedSqlite};
pub use zip_snapshot::zip_sqlite_snapshot;

use crate::error::CoreResult;
use crate::hasher::hash_file;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replaces `/ \ : <space>` with `_`, per spec §4.3.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | ' ' => '_',
            other => other,
        })
        .collect()
}

pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn device_dir(&self, case_id: &str, device_id: &str) -> PathBuf {
        self.root.join(case_id).join(device_id)
    }

    /// `<evidence_root>/<case_id>/<device_id>/<artifact_type>_<source_ref>_<unix_ts>.<ext>`
    pub fn snapshot_path(
        &self,
        case_id: &str,
        device_id: &str,
        artifact_type: &str,
        source_ref: &str,
        unix_ts: i64,
        ext: &str,
    ) -> PathBuf {
        let stem = sanitize_filename(&format!("{}_{}_{}", artifact_type, source_ref, unix_ts));
        self.device_dir(case_id, device_id).join(format!("{}.{}", stem, ext))
    }

    /// Writes a pretty-printed (two-space indent) JSON snapshot with no
    /// trailing newline, fsyncs it, and returns (path, sha256, size).
    pub fn write_json_snapshot(
        &self,
        case_id: &str,
        device_id: &str,
        artifact_type: &str,
        source_ref: &str,
        unix_ts: i64,
        value: &serde_json::Value,
    ) -> CoreResult<(PathBuf, String, u64)> {
        let path = self.snapshot_path(case_id, device_id, artifact_type, source_ref, unix_ts, "json");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let buf = serde_json::to_vec_pretty(value)?;
        let mut f = File::create(&path)?;
        f.write_all(&buf)?;
        f.sync_all()?;
        let (sha256, size) = hash_file(&path)?;
        Ok((path, sha256, size))
    }
}

/// Ensures a directory exists and is writable by creating and removing a
/// probe file inside it (used by the orchestrator's precheck step).
pub fn is_writable_dir(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".write_probe");
    let ok = fs::write(&probe, b"ok").is_ok();
    let _ = fs::remove_file(&probe);
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_hostile_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d e"), "a_b_c_d_e");
    }

    #[test]
    fn json_snapshot_has_no_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        let (path, sha, size) = store
            .write_json_snapshot("case_1", "dev_1", "installed_apps", "host", 1_700_000_000, &serde_json::json!({"a": 1}))
            .unwrap();
        let bytes = fs::read(&path).unwrap();
        assert!(!bytes.ends_with(b"\n"));
        let (recomputed, recomputed_size) = hash_file(&path).unwrap();
        assert_eq!(sha, recomputed);
        assert_eq!(size, recomputed_size);
    }
}
