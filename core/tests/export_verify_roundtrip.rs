//! Build a small case end to end, export a forensic archive, and verify
//! both the archive and the on-disk artifacts still match their stored
//! hashes (spec §4.8 scenario 3).

use ctrace_core::catalog::Catalog;
use ctrace_core::evidence_store::EvidenceStore;
use ctrace_core::exporter::{build_forensic_archive, verify_archive, verify_artifacts, ArchiveFileStatus};
use ctrace_core::model::{Artifact, ArtifactType, Device, OsType};

#[test]
fn exported_archive_and_artifacts_verify_clean() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.sqlite3");
    let catalog = Catalog::open(&db_path).unwrap();

    let case_id = catalog
        .ensure_case(None, Some("CASE-1"), None, "investigator", None, 1000)
        .unwrap();

    let device = Device {
        device_id: "dev_1".to_string(),
        case_id: case_id.clone(),
        os_type: OsType::Windows,
        device_name: Some("workstation".to_string()),
        identifier: Some("C:".to_string()),
        connection_type: "local".to_string(),
        authorized: true,
        auth_note: None,
        first_seen_at: 1000,
        last_seen_at: 1000,
    };
    catalog.upsert_device(&device).unwrap();

    let evidence_root = dir.path().join("evidence");
    let store = EvidenceStore::new(&evidence_root);
    let payload = serde_json::json!({"entries": [{"url": "https://example.com", "domain": "example.com"}]});
    let (snapshot_path, sha256, size_bytes) = store
        .write_json_snapshot(&case_id, &device.device_id, "browser_history", "chrome_default", 1000, &payload)
        .unwrap();

    let mut artifact = Artifact {
        artifact_id: "art_1".to_string(),
        case_id: case_id.clone(),
        device_id: device.device_id.clone(),
        artifact_type: ArtifactType::BrowserHistory,
        source_ref: "chrome_default".to_string(),
        snapshot_path: snapshot_path.to_string_lossy().into_owned(),
        sha256,
        size_bytes,
        collected_at: 1000,
        collector_name: "host".to_string(),
        collector_version: "1".to_string(),
        parser_version: "1".to_string(),
        acquisition_method: "file_copy".to_string(),
        payload_json: payload.to_string(),
        record_hash: String::new(),
    };
    artifact.record_hash = artifact.compute_record_hash();
    catalog.save_artifacts(&[artifact]).unwrap();

    catalog
        .append_audit(&case_id, None, "host_scan", "collect", "ok", "investigator", "test", None, 1000)
        .unwrap();

    let wallet_bundle = dir.path().join("wallet_signatures.yaml");
    let exchange_bundle = dir.path().join("exchange_domains.yaml");
    std::fs::write(&wallet_bundle, "rules: []\n").unwrap();
    std::fs::write(&exchange_bundle, "rules: []\n").unwrap();

    let staging_dir = dir.path().join("staging");
    let archive_path = dir.path().join("case_export.zip");
    build_forensic_archive(&catalog, &case_id, &staging_dir, &archive_path, &wallet_bundle, &exchange_bundle, 2000).unwrap();

    let archive_result = verify_archive(&archive_path).unwrap();
    assert!(archive_result.ok, "archive verification should pass: {:?}", archive_result);

    let artifact_results = verify_artifacts(&catalog, &case_id, None).unwrap();
    assert_eq!(artifact_results.len(), 1);
    assert_eq!(artifact_results[0].status, ArchiveFileStatus::Ok, "artifact verification should pass: {:?}", artifact_results[0]);
}
