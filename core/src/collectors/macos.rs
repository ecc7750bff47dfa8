//! macOS installed-apps collection (spec §4.5). `Info.plist` is read via
//! `plutil -convert json -o - <path>`, which transparently accepts both
//! the XML and binary plist forms without an extra parsing crate.

use crate::error::CoreResult;
use crate::evidence_store::EvidenceStore;
use crate::ids::{new_id, prefix};
use crate::model::{Artifact, ArtifactType};
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tracing::warn;
use walkdir::WalkDir;

fn read_info_plist_as_json(plist_path: &Path) -> Option<Value> {
    let output = Command::new("plutil").args(["-convert", "json", "-o", "-"]).arg(plist_path).output().ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

pub fn collect_installed_apps(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    app_search_roots: &[&Path],
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<Vec<Artifact>> {
    let mut artifacts = Vec::new();

    for root in app_search_roots {
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(root).min_depth(1).max_depth(1).into_iter().flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("app") {
                continue;
            }
            let info_plist = path.join("Contents").join("Info.plist");
            if !info_plist.is_file() {
                continue;
            }
            let Some(plist) = read_info_plist_as_json(&info_plist) else {
                warn!(app = %path.display(), "failed to read Info.plist");
                continue;
            };

            let name = plist
                .get("CFBundleDisplayName")
                .or_else(|| plist.get("CFBundleName"))
                .and_then(|v| v.as_str())
                .unwrap_or_else(|| path.file_stem().and_then(|s| s.to_str()).unwrap_or(""))
                .to_string();
            let bundle_id = plist.get("CFBundleIdentifier").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let version = plist
                .get("CFBundleShortVersionString")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let payload = serde_json::json!({
                "name": name,
                "bundle_id": bundle_id,
                "version": version,
                "install_location": path.to_string_lossy(),
                "path": path.to_string_lossy(),
            });
            let source_ref = if bundle_id.is_empty() { name.clone() } else { bundle_id.clone() };
            let (snapshot_path, sha256, size_bytes) =
                store.write_json_snapshot(case_id, device_id, ArtifactType::InstalledApps.as_str(), &source_ref, now, &payload)?;

            let mut artifact = Artifact {
                artifact_id: new_id(prefix::ARTIFACT),
                case_id: case_id.to_string(),
                device_id: device_id.to_string(),
                artifact_type: ArtifactType::InstalledApps,
                source_ref,
                snapshot_path: snapshot_path.to_string_lossy().into_owned(),
                sha256,
                size_bytes,
                collected_at: now,
                collector_name: collector_name.to_string(),
                collector_version: collector_version.to_string(),
                parser_version: "1".to_string(),
                acquisition_method: "app_bundle_scan".to_string(),
                payload_json: payload.to_string(),
                record_hash: String::new(),
            };
            artifact.record_hash = artifact.compute_record_hash();
            artifacts.push(artifact);
        }
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_non_app_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let store = EvidenceStore::new(dir.path().join("evidence"));
        let artifacts = collect_installed_apps(&store, "case_1", "dev_1", &[dir.path()], "macos_apps", "1", 1000).unwrap();
        assert!(artifacts.is_empty());
    }
}
