//! iOS backup mining (spec §4.5.2): locates a file inside an unencrypted
//! iTunes/Finder backup by its `Manifest.db` relative path, then feeds it
//! through the same safe-copy browser-history pipeline as a live device.

use super::history::{collect_browser_history, BrowserKind};
use crate::error::{CoreError, CoreResult};
use crate::evidence_store::EvidenceStore;
use crate::model::Artifact;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

const SAFARI_HISTORY_RELATIVE_PATH: &str = "Library/Safari/History.db";
const CHROME_HISTORY_RELATIVE_PATH: &str = "Library/Application Support/Google/Chrome/Default/History";

fn lookup_file_id(manifest_db: &Path, relative_path: &str) -> CoreResult<Option<String>> {
    let conn = Connection::open(manifest_db)?;
    let file_id: Option<String> = conn
        .query_row(
            "SELECT fileID FROM Files WHERE relativePath = ?1",
            [relative_path],
            |row| row.get(0),
        )
        .ok();
    Ok(file_id)
}

fn blob_path(backup_root: &Path, file_id: &str) -> CoreResult<PathBuf> {
    let flat = backup_root.join(file_id);
    if flat.is_file() {
        return Ok(flat);
    }
    let sharded = backup_root.join(&file_id[0..2.min(file_id.len())]).join(file_id);
    if sharded.is_file() {
        return Ok(sharded);
    }
    Err(CoreError::PartialCollection(format!("backup blob for fileID {} not found", file_id)))
}

fn looks_encrypted(path: &Path) -> CoreResult<bool> {
    let bytes = std::fs::read(path)?;
    Ok(!bytes.starts_with(SQLITE_MAGIC))
}

/// Returns `Ok(None)` with no artifacts and a caller-visible "skipped,
/// encrypted" reason when the located blob is not a plain SQLite file.
pub fn mine_ios_backup_history(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    backup_root: &Path,
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<(Vec<Artifact>, Vec<String>)> {
    let manifest_db = backup_root.join("Manifest.db");
    if !manifest_db.is_file() {
        return Err(CoreError::PreconditionFailed("Manifest.db not found in backup root".to_string()));
    }

    let mut artifacts = Vec::new();
    let mut warnings = Vec::new();

    for (relative_path, kind, label) in [
        (SAFARI_HISTORY_RELATIVE_PATH, BrowserKind::Safari, "ios_safari"),
        (CHROME_HISTORY_RELATIVE_PATH, BrowserKind::Chromium, "ios_chrome"),
    ] {
        let Some(file_id) = lookup_file_id(&manifest_db, relative_path)? else {
            continue;
        };
        let located = match blob_path(backup_root, &file_id) {
            Ok(p) => p,
            Err(e) => {
                warnings.push(format!("{}: {}", label, e));
                continue;
            }
        };

        if looks_encrypted(&located)? {
            warnings.push(format!("{}: backup appears encrypted, skipped", label));
            continue;
        }

        match collect_browser_history(store, case_id, device_id, kind, label, &located, collector_name, collector_version, now) {
            Ok(mut a) => artifacts.append(&mut a),
            Err(e) => warnings.push(format!("{}: {}", label, e)),
        }
    }

    Ok((artifacts, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_path_prefers_flat_layout() {
        let dir = tempfile::tempdir().unwrap();
        let file_id = "abcdef0123456789abcdef0123456789abcdef01";
        std::fs::write(dir.path().join(file_id), b"x").unwrap();
        let resolved = blob_path(dir.path(), file_id).unwrap();
        assert_eq!(resolved, dir.path().join(file_id));
    }

    #[test]
    fn blob_path_falls_back_to_sharded_layout() {
        let dir = tempfile::tempdir().unwrap();
        let file_id = "abcdef0123456789abcdef0123456789abcdef01";
        std::fs::create_dir_all(dir.path().join("ab")).unwrap();
        std::fs::write(dir.path().join("ab").join(file_id), b"x").unwrap();
        let resolved = blob_path(dir.path(), file_id).unwrap();
        assert_eq!(resolved, dir.path().join("ab").join(file_id));
    }

    #[test]
    fn non_sqlite_blob_is_treated_as_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"not a sqlite file").unwrap();
        assert!(looks_encrypted(&path).unwrap());
    }
}
