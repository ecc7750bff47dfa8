//! Archive and artifact re-verification (spec §4.8.2, §4.8.3).

use crate::audit_verify::{verify_chain, ChainVerifyResult};
use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::hasher::hash_bytes;
use crate::model::AuditLogRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFileStatus {
    Ok,
    Missing,
    Mismatch,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveVerifyResult {
    pub files_total: usize,
    pub failed: usize,
    pub file_statuses: Vec<(String, ArchiveFileStatus)>,
    pub audit_chain: Option<ChainVerifyResult>,
    pub ok: bool,
}

fn parse_hashes_sha256(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .filter_map(|l| {
            let l = l.trim_end_matches(['\r', '\n']);
            let hash_len = 64;
            if l.len() <= hash_len + 2 {
                return None;
            }
            let (hash, rest) = l.split_at(hash_len);
            let path = rest.trim_start_matches(' ');
            Some((hash.to_lowercase(), path.to_string()))
        })
        .collect()
}

/// Parses `hashes.sha256`, re-hashes every listed archive member, and
/// cross-checks the audit chain embedded in `manifest.json` if present.
pub fn verify_archive(archive_path: &Path) -> CoreResult<ArchiveVerifyResult> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| CoreError::Zip(e.to_string()))?;

    let hashes_text = read_member_text(&mut archive, "hashes.sha256")?;
    let entries = parse_hashes_sha256(&hashes_text);

    let mut file_statuses = Vec::new();
    let mut failed = 0usize;

    for (expected_hash, rel_path) in &entries {
        let status = match archive.by_name(rel_path) {
            Ok(mut zip_file) => {
                let mut buf = Vec::new();
                match zip_file.read_to_end(&mut buf) {
                    Ok(_) => {
                        let actual = hash_bytes(&buf);
                        if actual.eq_ignore_ascii_case(expected_hash) {
                            ArchiveFileStatus::Ok
                        } else {
                            ArchiveFileStatus::Mismatch
                        }
                    }
                    Err(_) => ArchiveFileStatus::Error,
                }
            }
            Err(zip::result::ZipError::FileNotFound) => ArchiveFileStatus::Missing,
            Err(_) => ArchiveFileStatus::Error,
        };
        if status != ArchiveFileStatus::Ok {
            failed += 1;
        }
        file_statuses.push((rel_path.clone(), status));
    }

    let audit_chain = match read_member_text(&mut archive, "manifest.json") {
        Ok(manifest_text) => {
            let manifest: serde_json::Value = serde_json::from_str(&manifest_text)?;
            manifest.get("audits").and_then(|v| v.as_array()).map(|arr| {
                let records: Vec<AuditLogRecord> = arr
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect();
                verify_chain(&records)
            })
        }
        Err(_) => None,
    };

    let audit_ok = audit_chain.as_ref().map(|r| r.ok).unwrap_or(true);
    Ok(ArchiveVerifyResult {
        files_total: entries.len(),
        failed,
        ok: failed == 0 && audit_ok,
        file_statuses,
        audit_chain,
    })
}

fn read_member_text(archive: &mut zip::ZipArchive<File>, name: &str) -> CoreResult<String> {
    let mut member = archive.by_name(name).map_err(|e| CoreError::Zip(e.to_string()))?;
    let mut text = String::new();
    member.read_to_string(&mut text)?;
    Ok(text)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactVerifyResult {
    pub artifact_id: String,
    pub status: ArchiveFileStatus,
    pub expected_sha256: String,
    pub actual_sha256: Option<String>,
}

/// Recomputes `hash_file` for every artifact in a case (or a single
/// artifact id) and compares to the catalog's stored digest and size.
pub fn verify_artifacts(catalog: &Catalog, case_id: &str, only_artifact_id: Option<&str>) -> CoreResult<Vec<ArtifactVerifyResult>> {
    let artifacts = catalog.list_artifacts(case_id)?;
    let mut out = Vec::new();
    for artifact in artifacts {
        if let Some(only) = only_artifact_id {
            if artifact.artifact_id != only {
                continue;
            }
        }
        let path = Path::new(&artifact.snapshot_path);
        let result = if !path.exists() {
            ArtifactVerifyResult {
                artifact_id: artifact.artifact_id.clone(),
                status: ArchiveFileStatus::Missing,
                expected_sha256: artifact.sha256.clone(),
                actual_sha256: None,
            }
        } else {
            match crate::hasher::hash_file(path) {
                Ok((actual, size)) => {
                    let status = if actual.eq_ignore_ascii_case(&artifact.sha256) && size == artifact.size_bytes {
                        ArchiveFileStatus::Ok
                    } else {
                        ArchiveFileStatus::Mismatch
                    };
                    ArtifactVerifyResult {
                        artifact_id: artifact.artifact_id.clone(),
                        status,
                        expected_sha256: artifact.sha256.clone(),
                        actual_sha256: Some(actual),
                    }
                }
                Err(_) => ArtifactVerifyResult {
                    artifact_id: artifact.artifact_id.clone(),
                    status: ArchiveFileStatus::Error,
                    expected_sha256: artifact.sha256.clone(),
                    actual_sha256: None,
                },
            }
        };
        out.push(result);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sha256sum_format_skipping_comments_and_blanks() {
        let text = "# comment\n\nabc123  path/to/file\n";
        let hash_64 = "a".repeat(64);
        let text = format!("{}{}  another/file\n", text, hash_64);
        let entries = parse_hashes_sha256(&text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "another/file");
    }
}
