//! Browser extension discovery shared by the Windows and macOS collectors
//! (spec §4.5).

use crate::error::CoreResult;
use crate::evidence_store::EvidenceStore;
use crate::ids::{new_id, prefix};
use crate::model::{Artifact, ArtifactType};
use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

const LOCALE_FALLBACKS: [&str; 3] = ["en", "en_US", "zh_CN"];

fn resolve_message_placeholder(name: &str, locale_dir: &Path) -> Option<String> {
    let key = name.strip_prefix("__MSG_")?.strip_suffix("__")?;
    for locale in locale_dir.read_dir().ok()?.flatten() {
        let messages_path = locale.path().join("messages.json");
        if !messages_path.exists() {
            continue;
        }
        if let Ok(text) = std::fs::read_to_string(&messages_path) {
            if let Ok(v) = serde_json::from_str::<Value>(&text) {
                if let Some(msg) = v.get(key).and_then(|m| m.get("message")).and_then(|m| m.as_str()) {
                    return Some(msg.to_string());
                }
            }
        }
    }
    None
}

fn resolve_locale(name: &str, extension_dir: &Path, default_locale: Option<&str>) -> String {
    if !name.starts_with("__MSG_") {
        return name.to_string();
    }
    let locales_dir = extension_dir.join("_locales");
    if !locales_dir.is_dir() {
        return name.to_string();
    }

    let mut candidates: Vec<String> = Vec::new();
    if let Some(default) = default_locale {
        candidates.push(default.to_string());
    }
    candidates.extend(LOCALE_FALLBACKS.iter().map(|s| s.to_string()));

    for candidate in candidates {
        let dir = locales_dir.join(&candidate);
        if dir.is_dir() {
            if let Some(resolved) = resolve_message_placeholder(name, &locales_dir) {
                let _ = dir;
                return resolved;
            }
        }
    }
    resolve_message_placeholder(name, &locales_dir).unwrap_or_else(|| name.to_string())
}

/// Scans one profile's extension directory tree for Chromium-style
/// (`manifest.json` per version directory) or Gecko-style
/// (`extensions.json` index) extension metadata.
pub fn scan_chromium_extensions(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    profile_dir: &Path,
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<Vec<Artifact>> {
    let extensions_root = profile_dir.join("Extensions");
    if !extensions_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    for ext_entry in WalkDir::new(&extensions_root).min_depth(1).max_depth(1).into_iter().flatten() {
        let extension_id = ext_entry.file_name().to_string_lossy().to_string();
        for version_entry in WalkDir::new(ext_entry.path()).min_depth(1).max_depth(1).into_iter().flatten() {
            let manifest_path = version_entry.path().join("manifest.json");
            if !manifest_path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&manifest_path)?;
            let manifest: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => continue,
            };

            let default_locale = manifest.get("default_locale").and_then(|v| v.as_str());
            let raw_name = manifest.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let name = resolve_locale(&raw_name, version_entry.path(), default_locale);
            let version = manifest.get("version").and_then(|v| v.as_str()).unwrap_or("").to_string();

            let payload = serde_json::json!({
                "extension_id": extension_id,
                "name": name,
                "version": version,
            });
            let (snapshot_path, sha256, size_bytes) = store.write_json_snapshot(
                case_id,
                device_id,
                ArtifactType::BrowserExtension.as_str(),
                &extension_id,
                now,
                &payload,
            )?;

            let mut artifact = Artifact {
                artifact_id: new_id(prefix::ARTIFACT),
                case_id: case_id.to_string(),
                device_id: device_id.to_string(),
                artifact_type: ArtifactType::BrowserExtension,
                source_ref: extension_id.clone(),
                snapshot_path: snapshot_path.to_string_lossy().into_owned(),
                sha256,
                size_bytes,
                collected_at: now,
                collector_name: collector_name.to_string(),
                collector_version: collector_version.to_string(),
                parser_version: "1".to_string(),
                acquisition_method: "directory_scan".to_string(),
                payload_json: payload.to_string(),
                record_hash: String::new(),
            };
            artifact.record_hash = artifact.compute_record_hash();
            artifacts.push(artifact);
        }
    }
    Ok(artifacts)
}

pub fn scan_gecko_extensions(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    profile_dir: &Path,
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<Vec<Artifact>> {
    let index_path = profile_dir.join("extensions.json");
    if !index_path.is_file() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&index_path)?;
    let index: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(_) => return Ok(Vec::new()),
    };
    let Some(addons) = index.get("addons").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    let mut artifacts = Vec::new();
    for addon in addons {
        let extension_id = addon.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
        if extension_id.is_empty() {
            continue;
        }
        let name = addon
            .get("defaultLocale")
            .and_then(|v| v.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let version = addon.get("version").and_then(|v| v.as_str()).unwrap_or("").to_string();

        let payload = serde_json::json!({"extension_id": extension_id, "name": name, "version": version});
        let (snapshot_path, sha256, size_bytes) = store.write_json_snapshot(
            case_id,
            device_id,
            ArtifactType::BrowserExtension.as_str(),
            &extension_id,
            now,
            &payload,
        )?;

        let mut artifact = Artifact {
            artifact_id: new_id(prefix::ARTIFACT),
            case_id: case_id.to_string(),
            device_id: device_id.to_string(),
            artifact_type: ArtifactType::BrowserExtension,
            source_ref: extension_id.clone(),
            snapshot_path: snapshot_path.to_string_lossy().into_owned(),
            sha256,
            size_bytes,
            collected_at: now,
            collector_name: collector_name.to_string(),
            collector_version: collector_version.to_string(),
            parser_version: "1".to_string(),
            acquisition_method: "directory_scan".to_string(),
            payload_json: payload.to_string(),
            record_hash: String::new(),
        };
        artifact.record_hash = artifact.compute_record_hash();
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_chromium_extension_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ext_dir = dir.path().join("Extensions").join("nkbihfbeogaeaoehlefnkodbefgpgknn").join("10.1.0_0");
        fs::create_dir_all(&ext_dir).unwrap();
        fs::write(
            ext_dir.join("manifest.json"),
            r#"{"name": "MetaMask", "version": "10.1.0"}"#,
        )
        .unwrap();

        let store = EvidenceStore::new(dir.path().join("evidence"));
        let artifacts = scan_chromium_extensions(&store, "case_1", "dev_1", dir.path(), "windows_extensions", "1", 1000).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].source_ref, "nkbihfbeogaeaoehlefnkodbefgpgknn");
    }
}
