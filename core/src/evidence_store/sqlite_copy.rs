//! Safe, non-mutating copy of a live SQLite database plus its `-wal`/`-shm`
//! sidecars (spec §4.3, §4.5.1, §5). Temp directories are scoped to the
//! returned value's lifetime via `tempfile::TempDir` and are removed on
//! every exit path, including early return or panic unwind.

use crate::error::CoreResult;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct CopiedSqlite {
    _dir: TempDir,
    pub base_path: PathBuf,
    pub sidecar_paths: Vec<PathBuf>,
}

impl CopiedSqlite {
    pub fn all_paths(&self) -> Vec<&Path> {
        let mut out = vec![self.base_path.as_path()];
        out.extend(self.sidecar_paths.iter().map(|p| p.as_path()));
        out
    }
}

/// Copies `base_db_path` and any existing `-wal`/`-shm` sidecars into a
/// fresh scoped temp directory, preserving original file names. Never
/// opens or alters the source files other than a read for the copy.
pub fn safe_copy_sqlite(base_db_path: &Path) -> CoreResult<CopiedSqlite> {
    let dir = TempDir::new()?;
    let file_name = base_db_path
        .file_name()
        .ok_or_else(|| crate::error::CoreError::InputInvalid("sqlite path has no file name".to_string()))?;

    let dest_base = dir.path().join(file_name);
    fs::copy(base_db_path, &dest_base)?;

    let mut sidecar_paths = Vec::new();
    for suffix in ["-wal", "-shm"] {
        let src = append_suffix(base_db_path, suffix);
        if src.exists() {
            let dest = append_suffix(&dest_base, suffix);
            fs::copy(&src, &dest)?;
            sidecar_paths.push(dest);
        }
    }

    Ok(CopiedSqlite {
        _dir: dir,
        base_path: dest_base,
        sidecar_paths,
    })
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn copies_base_and_sidecars_without_touching_originals() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("history.sqlite");
        fs::write(&base, b"BASE").unwrap();
        let wal = append_suffix(&base, "-wal");
        fs::write(&wal, b"WAL").unwrap();

        let copied = safe_copy_sqlite(&base).unwrap();
        assert_eq!(fs::read(&copied.base_path).unwrap(), b"BASE");
        assert_eq!(copied.sidecar_paths.len(), 1);
        assert_eq!(fs::read(&copied.sidecar_paths[0]).unwrap(), b"WAL");

        // Originals untouched.
        assert_eq!(fs::read(&base).unwrap(), b"BASE");
        assert_eq!(fs::read(&wal).unwrap(), b"WAL");

        // Copy lives under a different directory.
        assert_ne!(copied.base_path.parent(), base.parent());
    }

    #[test]
    fn missing_sidecars_are_simply_absent() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nowal.sqlite");
        let mut f = fs::File::create(&base).unwrap();
        f.write_all(b"X").unwrap();
        drop(f);
        let copied = safe_copy_sqlite(&base).unwrap();
        assert!(copied.sidecar_paths.is_empty());
    }
}
