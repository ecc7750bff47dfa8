//! Sorted-entry ZIP bundling of a SQLite database and its sidecars
//! (spec §4.3). Entry order is deterministic: base file first is not
//! assumed — names are sorted lexicographically so the same source set
//! always produces the same archive layout.

use crate::error::CoreError;
use crate::evidence_store::CopiedSqlite;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Writes `copied`'s base file and any `-wal`/`-shm` sidecars into a new
/// zip at `dest_zip_path`, each entry named after the source file's own
/// base name, in sorted order.
pub fn zip_sqlite_snapshot(copied: &CopiedSqlite, dest_zip_path: &Path) -> Result<(), CoreError> {
    let mut entries: Vec<&Path> = copied.all_paths();
    entries.sort_by_key(|p| p.file_name().map(|n| n.to_owned()));

    let file = File::create(dest_zip_path)?;
    let mut writer = ZipWriter::new(file);
    let options: FileOptions<()> = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for path in entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::Zip(format!("non-utf8 file name: {:?}", path)))?;
        writer
            .start_file(name, options)
            .map_err(|e| CoreError::Zip(e.to_string()))?;
        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
    }

    let file = writer.finish().map_err(|e| CoreError::Zip(e.to_string()))?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence_store::safe_copy_sqlite;
    use std::fs;

    #[test]
    fn bundles_base_and_sidecars_in_sorted_order() {
        let src_dir = tempfile::tempdir().unwrap();
        let base = src_dir.path().join("history.sqlite");
        fs::write(&base, b"BASE").unwrap();
        fs::write(src_dir.path().join("history.sqlite-wal"), b"WAL").unwrap();
        fs::write(src_dir.path().join("history.sqlite-shm"), b"SHM").unwrap();

        let copied = safe_copy_sqlite(&base).unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let zip_path = out_dir.path().join("snapshot.zip");
        zip_sqlite_snapshot(&copied, &zip_path).unwrap();

        let zip_bytes = fs::read(&zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        let mut expected = vec![
            "history.sqlite".to_string(),
            "history.sqlite-shm".to_string(),
            "history.sqlite-wal".to_string(),
        ];
        names.sort();
        expected.sort();
        assert_eq!(names, expected);
    }
}
