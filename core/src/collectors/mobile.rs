//! Mobile package enumeration (spec §4.5): Android via the `adb` debug
//! transport, iOS via the `ideviceinstaller` pairing-transport tool. Both
//! are external platform tools already required to talk to a connected
//! device at all; no bundled binding crate is needed.

use crate::error::CoreResult;
use crate::evidence_store::EvidenceStore;
use crate::ids::{new_id, prefix};
use crate::model::{Artifact, ArtifactType, OsType};
use std::process::Command;

pub fn collect_android_packages(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    serial: &str,
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<Vec<Artifact>> {
    let output = Command::new("adb").args(["-s", serial, "shell", "pm", "list", "packages", "-f"]).output()?;
    let text = String::from_utf8_lossy(&output.stdout);

    let mut artifacts = Vec::new();
    for line in text.lines() {
        // Line shape: "package:/data/app/~~xyz/com.example.app-abc==/base.apk=com.example.app"
        let Some(rest) = line.strip_prefix("package:") else { continue };
        let Some((apk_path, package)) = rest.rsplit_once('=') else { continue };

        let payload = serde_json::json!({
            "os": OsType::Android.as_str(),
            "identifier": serial,
            "package": package,
            "apk_path": apk_path,
        });
        let (snapshot_path, sha256, size_bytes) =
            store.write_json_snapshot(case_id, device_id, ArtifactType::MobilePackages.as_str(), package, now, &payload)?;

        let mut artifact = Artifact {
            artifact_id: new_id(prefix::ARTIFACT),
            case_id: case_id.to_string(),
            device_id: device_id.to_string(),
            artifact_type: ArtifactType::MobilePackages,
            source_ref: package.to_string(),
            snapshot_path: snapshot_path.to_string_lossy().into_owned(),
            sha256,
            size_bytes,
            collected_at: now,
            collector_name: collector_name.to_string(),
            collector_version: collector_version.to_string(),
            parser_version: "1".to_string(),
            acquisition_method: "adb_debug_transport".to_string(),
            payload_json: payload.to_string(),
            record_hash: String::new(),
        };
        artifact.record_hash = artifact.compute_record_hash();
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

pub fn collect_ios_packages(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    udid: &str,
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<Vec<Artifact>> {
    let output = Command::new("ideviceinstaller").args(["-u", udid, "-l"]).output()?;
    let text = String::from_utf8_lossy(&output.stdout);

    let mut artifacts = Vec::new();
    for line in text.lines() {
        let Some((bundle_id, _rest)) = line.split_once(',') else { continue };
        let bundle_id = bundle_id.trim();
        if bundle_id.is_empty() || bundle_id == "CFBundleIdentifier" {
            continue;
        }

        let payload = serde_json::json!({
            "os": OsType::Ios.as_str(),
            "identifier": udid,
            "package": bundle_id,
        });
        let (snapshot_path, sha256, size_bytes) =
            store.write_json_snapshot(case_id, device_id, ArtifactType::MobilePackages.as_str(), bundle_id, now, &payload)?;

        let mut artifact = Artifact {
            artifact_id: new_id(prefix::ARTIFACT),
            case_id: case_id.to_string(),
            device_id: device_id.to_string(),
            artifact_type: ArtifactType::MobilePackages,
            source_ref: bundle_id.to_string(),
            snapshot_path: snapshot_path.to_string_lossy().into_owned(),
            sha256,
            size_bytes,
            collected_at: now,
            collector_name: collector_name.to_string(),
            collector_version: collector_version.to_string(),
            parser_version: "1".to_string(),
            acquisition_method: "ios_pairing_transport".to_string(),
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

    #[test]
    fn android_package_line_splits_on_last_equals() {
        let line = "package:/data/app/~~abc==/com.example.wallet-1==/base.apk=com.example.wallet";
        let rest = line.strip_prefix("package:").unwrap();
        let (apk_path, package) = rest.rsplit_once('=').unwrap();
        assert_eq!(package, "com.example.wallet");
        assert!(apk_path.ends_with("base.apk"));
    }
}
