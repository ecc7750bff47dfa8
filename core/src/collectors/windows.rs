//! Windows installed-apps collection (spec §4.5) via the `reg query`
//! command-line tool. Reading the raw registry hive directly would need a
//! Win32-binding crate this workspace does not otherwise carry; `reg.exe`
//! is present on every supported Windows release and gives the same
//! uninstall-key view.

use crate::error::CoreResult;
use crate::evidence_store::EvidenceStore;
use crate::ids::{new_id, prefix};
use crate::model::{Artifact, ArtifactType};
use std::process::Command;
use tracing::warn;

const UNINSTALL_HIVES: [(&str, &str); 3] = [
    ("HKLM64", r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall"),
    ("HKLM32", r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall"),
    ("HKCU", r"HKCU\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall"),
];

#[derive(Debug, Clone, Default)]
pub struct InstalledApp {
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub install_location: String,
    pub install_date: String,
    pub uninstall_string: String,
    pub display_icon: String,
}

/// Parses `reg query <key> /s` output into one `InstalledApp` per
/// subkey, keyed on the fields the scan cares about.
fn parse_reg_query_output(output: &str) -> Vec<InstalledApp> {
    let mut apps = Vec::new();
    let mut current = InstalledApp::default();
    let mut has_content = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("HKEY_") {
            if has_content && !current.name.is_empty() {
                apps.push(std::mem::take(&mut current));
            }
            has_content = false;
            continue;
        }
        let Some((key, rest)) = split_reg_value_line(trimmed) else { continue };
        has_content = true;
        match key {
            "DisplayName" => current.name = rest,
            "DisplayVersion" => current.version = rest,
            "Publisher" => current.publisher = rest,
            "InstallLocation" => current.install_location = rest,
            "InstallDate" => current.install_date = rest,
            "UninstallString" => current.uninstall_string = rest,
            "DisplayIcon" => current.display_icon = rest,
            _ => {}
        }
    }
    if has_content && !current.name.is_empty() {
        apps.push(current);
    }
    apps
}

fn split_reg_value_line(line: &str) -> Option<(&str, String)> {
    let mut parts = line.splitn(3, "    ");
    let name = parts.next()?.trim();
    let _reg_type = parts.next()?;
    let value = parts.next().unwrap_or("").trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some((name, value))
    }
}

fn query_hive(hive_key: &str) -> CoreResult<String> {
    let output = Command::new("reg").args(["query", hive_key, "/s"]).output()?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn collect_installed_apps(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<Vec<Artifact>> {
    let mut artifacts = Vec::new();
    for (label, hive_key) in UNINSTALL_HIVES {
        let raw = match query_hive(hive_key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(hive = label, error = %e, "registry hive query failed");
                continue;
            }
        };
        for app in parse_reg_query_output(&raw) {
            let payload = serde_json::json!({
                "name": app.name,
                "version": app.version,
                "publisher": app.publisher,
                "install_location": app.install_location,
                "install_date": app.install_date,
                "uninstall_string": app.uninstall_string,
                "display_icon": app.display_icon,
                "hive": label,
            });
            let source_ref = format!("{}:{}", label, app.name);
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
                acquisition_method: "registry_query".to_string(),
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
    fn parses_reg_query_text_block() {
        let sample = "\
HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Uninstall\\MetaMask
    DisplayName    REG_SZ    MetaMask Wallet
    DisplayVersion    REG_SZ    10.1.0
    Publisher    REG_SZ    MetaMask Inc
    InstallLocation    REG_SZ    C:\\Program Files\\MetaMask
";
        let apps = parse_reg_query_output(sample);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "MetaMask Wallet");
        assert_eq!(apps[0].version, "10.1.0");
    }
}
