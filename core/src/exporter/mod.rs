//! Forensic archive assembly and verification (spec §4.8).

mod verify;

pub use verify::{verify_archive, verify_artifacts, ArchiveFileStatus, ArchiveVerifyResult, ArtifactVerifyResult};

use crate::canonical_json::to_canonical_bytes;
use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::hasher::hash_file;
use crate::model::ReportType;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

#[derive(Debug, Serialize)]
struct ManifestArtifact {
    artifact_id: String,
    artifact_type: String,
    sha256: String,
    size_bytes: u64,
    archive_path: String,
}

#[derive(Debug, Serialize)]
struct ManifestReport {
    report_id: String,
    report_type: String,
    archive_path: String,
    sha256: String,
}

#[derive(Debug, Serialize)]
struct ManifestRuleBundle {
    bundle_type: String,
    version: String,
    sha256: String,
    source_path: String,
    archive_path: String,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    case: &'a crate::model::Case,
    devices: &'a [crate::model::Device],
    artifacts: Vec<ManifestArtifact>,
    reports: Vec<ManifestReport>,
    prechecks: &'a [crate::model::PrecheckResult],
    audits: &'a [crate::model::AuditLogRecord],
    rule_bundles: Vec<ManifestRuleBundle>,
}

fn report_ext(report_type: ReportType) -> &'static str {
    match report_type {
        ReportType::InternalJson => "json",
        ReportType::InternalHtml => "html",
        ReportType::ForensicZip => "zip",
        ReportType::ForensicPdf => "pdf",
    }
}

/// Stages every archive member under `staging_dir`, then zips the staged
/// tree with entries in sorted-by-path order, and returns the archive's
/// own SHA-256.
pub fn build_forensic_archive(
    catalog: &Catalog,
    case_id: &str,
    staging_dir: &Path,
    archive_dest_path: &Path,
    wallet_bundle_path: &Path,
    exchange_bundle_path: &Path,
    now: i64,
) -> CoreResult<String> {
    let case = catalog
        .get_case(case_id)?
        .ok_or_else(|| CoreError::InputInvalid(format!("case '{}' not found", case_id)))?;
    let devices = catalog.list_devices(case_id)?;
    let artifacts = catalog.list_artifacts(case_id)?;
    let reports = catalog.list_reports(case_id)?;
    let prechecks = catalog.list_prechecks(case_id)?;
    let audits = catalog.list_audit(case_id)?;

    fs::create_dir_all(staging_dir)?;
    let evidence_dir = staging_dir.join("evidence");
    let reports_dir = staging_dir.join("reports");
    let rules_dir = staging_dir.join("rules");
    fs::create_dir_all(&evidence_dir)?;
    fs::create_dir_all(&reports_dir)?;
    fs::create_dir_all(&rules_dir)?;

    let mut manifest_artifacts = Vec::new();
    for artifact in &artifacts {
        let source = Path::new(&artifact.snapshot_path);
        let file_name = source.file_name().ok_or_else(|| CoreError::InputInvalid("artifact snapshot has no file name".to_string()))?;
        let device_dir = evidence_dir.join(&artifact.device_id);
        fs::create_dir_all(&device_dir)?;
        let dest = device_dir.join(file_name);
        fs::copy(source, &dest)?;
        manifest_artifacts.push(ManifestArtifact {
            artifact_id: artifact.artifact_id.clone(),
            artifact_type: artifact.artifact_type.as_str().to_string(),
            sha256: artifact.sha256.clone(),
            size_bytes: artifact.size_bytes,
            archive_path: format!("evidence/{}/{}", artifact.device_id, file_name.to_string_lossy()),
        });
    }

    let mut manifest_reports = Vec::new();
    for report in &reports {
        let source = Path::new(&report.file_path);
        let ext = report_ext(report.report_type);
        let dest_name = format!("{}_{}.{}", report.report_id, report.report_type.as_str(), ext);
        let dest = reports_dir.join(&dest_name);
        if source.exists() {
            fs::copy(source, &dest)?;
        }
        manifest_reports.push(ManifestReport {
            report_id: report.report_id.clone(),
            report_type: report.report_type.as_str().to_string(),
            archive_path: format!("reports/{}", dest_name),
            sha256: report.sha256.clone(),
        });
    }

    let mut manifest_bundles = Vec::new();
    for (bundle_type, source_path) in [("wallet_signatures", wallet_bundle_path), ("exchange_domains", exchange_bundle_path)] {
        let file_name = source_path.file_name().ok_or_else(|| CoreError::InputInvalid("rule bundle path has no file name".to_string()))?;
        let dest = rules_dir.join(file_name);
        fs::copy(source_path, &dest)?;
        let (sha256, _) = hash_file(source_path)?;
        let version = catalog.get_rule_bundle_version(bundle_type, &sha256)?.unwrap_or_default();
        manifest_bundles.push(ManifestRuleBundle {
            bundle_type: bundle_type.to_string(),
            version,
            sha256,
            source_path: source_path.to_string_lossy().into_owned(),
            archive_path: format!("rules/{}", file_name.to_string_lossy()),
        });
    }

    let manifest = Manifest {
        case: &case,
        devices: &devices,
        artifacts: manifest_artifacts,
        reports: manifest_reports,
        prechecks: &prechecks,
        audits: &audits,
        rule_bundles: manifest_bundles,
    };
    let manifest_bytes = to_canonical_bytes(&manifest)?;
    let manifest_path = staging_dir.join("manifest.json");
    fs::write(&manifest_path, &manifest_bytes)?;

    // hashes.sha256 covers every other staged file, sorted by relative path.
    let mut entries: BTreeMap<String, PathBuf> = BTreeMap::new();
    collect_staged_files(staging_dir, staging_dir, &mut entries)?;
    entries.remove("hashes.sha256");

    let mut hashes_text = String::new();
    for (rel_path, abs_path) in &entries {
        let (sha256, _) = hash_file(abs_path)?;
        hashes_text.push_str(&format!("{}  {}\n", sha256, rel_path));
    }
    let hashes_path = staging_dir.join("hashes.sha256");
    fs::write(&hashes_path, &hashes_text)?;

    entries.insert("hashes.sha256".to_string(), hashes_path.clone());

    if let Some(parent) = archive_dest_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(archive_dest_path)?;
    let mut writer = ZipWriter::new(file);
    let options: FileOptions<()> = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (rel_path, abs_path) in &entries {
        writer.start_file(rel_path, options).map_err(|e| CoreError::Zip(e.to_string()))?;
        let mut buf = Vec::new();
        File::open(abs_path)?.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
    }
    writer.finish().map_err(|e| CoreError::Zip(e.to_string()))?;

    let (sha256, _) = hash_file(archive_dest_path)?;
    catalog.save_report(
        case_id,
        ReportType::ForensicZip,
        &archive_dest_path.to_string_lossy(),
        &sha256,
        "exporter",
        "ok",
        now,
    )?;
    Ok(sha256)
}

fn collect_staged_files(root: &Path, dir: &Path, out: &mut BTreeMap<String, PathBuf>) -> CoreResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_staged_files(root, &path, out)?;
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            out.insert(rel, path);
        }
    }
    Ok(())
}
