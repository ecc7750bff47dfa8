//! Scan orchestrator state machine (spec §4.7):
//!
//! `init → ensure_case → write_prechecks → detect_device → upsert_device →
//!  collect → persist_artifacts → load_rules → ensure_bundles →
//!  match → persist_hits → write_reports → audit_finish`

use crate::catalog::Catalog;
use crate::collectors::CollectorOutcome;
use crate::error::{CoreError, CoreResult};
use crate::evidence_store::{is_writable_dir, EvidenceStore};
use crate::ids::{new_id, prefix};
use crate::matcher;
use crate::model::{Device, PrecheckResult, PrecheckStatus, ScanScope};
use crate::rules::{LoadedExchangeBundle, LoadedWalletBundle};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyMode {
    Off,
    Masked,
}

impl PrivacyMode {
    /// Unknown values coerce to `off` (spec §4.7 "init").
    pub fn parse(raw: &str) -> Self {
        match raw {
            "masked" => PrivacyMode::Masked,
            _ => PrivacyMode::Off,
        }
    }
}

pub struct OrchestratorConfig {
    pub evidence_root: PathBuf,
    pub db_dir: PathBuf,
    pub ios_backup_dir: PathBuf,
    pub profile: Profile,
    pub privacy_mode: PrivacyMode,
}

pub struct ScanRequest {
    pub case_id: Option<String>,
    pub case_no: Option<String>,
    pub title: Option<String>,
    pub operator: String,
    pub note: Option<String>,
    pub device: Device,
    pub scan_scope: ScanScope,
    pub require_auth_order: bool,
    pub authorization_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Success,
    Failed,
}

pub struct ScanResult {
    pub case_id: String,
    pub status: ScanStatus,
    pub artifact_count: usize,
    pub hit_count: usize,
    pub warnings: Vec<String>,
    pub report_paths: Vec<String>,
}

/// Runs one full scan. `collect` is supplied by the caller (cli or a
/// platform-specific glue layer) so this module stays free of any single
/// OS's process-invocation details; it is the "list of collector
/// handles" spec §9 describes.
pub fn run_scan(
    catalog: &Catalog,
    store: &EvidenceStore,
    config: &OrchestratorConfig,
    mut request: ScanRequest,
    wallet_bundle_path: &std::path::Path,
    exchange_bundle_path: &std::path::Path,
    collect: impl FnOnce(&str) -> CollectorOutcome,
    now: i64,
) -> CoreResult<ScanResult> {
    // init
    fs::create_dir_all(&config.evidence_root)?;
    fs::create_dir_all(&config.db_dir)?;
    fs::create_dir_all(&config.ios_backup_dir)?;

    let case_id = catalog.ensure_case(
        request.case_id.as_deref(),
        request.case_no.as_deref(),
        request.title.as_deref(),
        &request.operator,
        request.note.as_deref(),
        now,
    )?;

    let event_type = match request.scan_scope {
        ScanScope::Mobile => "mobile_scan",
        _ => "host_scan",
    };
    catalog.append_audit(&case_id, None, event_type, "scan_start", "started", &request.operator, "orchestrator", None, now)?;
    info!(case_id = %case_id, event_type, "scan started");

    // prechecks
    let mut prechecks = Vec::new();
    let mut abort_reason: Option<String> = None;

    if config.profile == Profile::External && request.require_auth_order && request.authorization_order.is_none() {
        let failed = precheck(
            &case_id,
            request.scan_scope,
            "auth_order_required",
            "Authorization order required",
            true,
            PrecheckStatus::Failed,
            "missing authorization order",
            now,
        );
        prechecks.push(failed);
        abort_reason = Some("authorization order required in external profile".to_string());
    } else {
        prechecks.push(precheck(
            &case_id,
            request.scan_scope,
            "auth_order_present",
            "Authorization order present",
            false,
            PrecheckStatus::Passed,
            "ok",
            now,
        ));
    }

    let evidence_writable = is_writable_dir(&config.evidence_root);
    prechecks.push(precheck(
        &case_id,
        request.scan_scope,
        "evidence_dir_writable",
        "Evidence directory writable",
        true,
        if evidence_writable { PrecheckStatus::Passed } else { PrecheckStatus::Failed },
        if evidence_writable { "ok" } else { "evidence directory is not writable" },
        now,
    ));
    if !evidence_writable && abort_reason.is_none() {
        abort_reason = Some("evidence directory not writable".to_string());
    }

    prechecks.push(precheck(
        &case_id,
        request.scan_scope,
        "os_supported",
        "Device OS supported",
        true,
        PrecheckStatus::Passed,
        "ok",
        now,
    ));
    prechecks.push(precheck(
        &case_id,
        request.scan_scope,
        "privacy_mode_recorded",
        "Privacy mode recorded",
        false,
        PrecheckStatus::Passed,
        match config.privacy_mode {
            PrivacyMode::Off => "off",
            PrivacyMode::Masked => "masked",
        },
        now,
    ));

    catalog.save_prechecks(&prechecks)?;

    if let Some(reason) = abort_reason {
        catalog.append_audit(
            &case_id,
            None,
            "precheck",
            "precheck_failed",
            "failed",
            &request.operator,
            "orchestrator",
            Some(&serde_json::json!({"reason": reason})),
            now,
        )?;
        catalog.append_audit(&case_id, None, event_type, "scan_finish", "failed", &request.operator, "orchestrator", Some(&serde_json::json!({"reason": reason})), now)?;
        return Err(CoreError::Fatal(reason));
    }

    // detect_device + upsert_device
    request.device.case_id = case_id.clone();
    catalog.upsert_device(&request.device)?;

    // collect + persist_artifacts
    let outcome = collect(&case_id);
    let mut warnings = outcome.warnings;
    if outcome.artifacts.is_empty() && !warnings.is_empty() {
        warn!(case_id = %case_id, "collectors produced no artifacts");
    }
    if catalog.save_artifacts(&outcome.artifacts).is_err() {
        let reason = "failed to persist collected artifacts".to_string();
        catalog.append_audit(&case_id, None, event_type, "scan_finish", "failed", &request.operator, "orchestrator", Some(&serde_json::json!({"reason": reason})), now)?;
        return Err(CoreError::Fatal(reason));
    }

    let overall_failed = outcome.artifacts.is_empty();

    // load_rules (fatal on failure)
    let wallet: LoadedWalletBundle = crate::rules::load_wallet_bundle(wallet_bundle_path)?;
    let exchange: LoadedExchangeBundle = crate::rules::load_exchange_bundle(exchange_bundle_path)?;

    // ensure_bundles
    let wallet_bundle_id = catalog.ensure_rule_bundle("wallet_signatures", &wallet.file.version, &wallet.sha256, &wallet.source_path)?;
    let exchange_bundle_id = catalog.ensure_rule_bundle("exchange_domains", &exchange.file.version, &exchange.sha256, &exchange.source_path)?;
    catalog.set_schema_meta("active_wallet_rule_path", &wallet.source_path)?;
    catalog.set_schema_meta("active_exchange_rule_path", &exchange.source_path)?;

    // match + persist_hits
    let mut raw_hits = Vec::new();
    raw_hits.extend(matcher::match_wallet_extension(&outcome.artifacts, &wallet.file.rules, Some(&wallet_bundle_id), &wallet.file.version));
    raw_hits.extend(matcher::match_wallet_keyword(&outcome.artifacts, &wallet.file.rules, Some(&wallet_bundle_id), &wallet.file.version));
    raw_hits.extend(matcher::match_wallet_mobile(&outcome.artifacts, &wallet.file.rules, Some(&wallet_bundle_id), &wallet.file.version));
    raw_hits.extend(matcher::match_exchange_domain(&outcome.artifacts, &exchange.file.rules, Some(&exchange_bundle_id), &exchange.file.version));
    raw_hits.extend(matcher::match_wallet_addresses(&outcome.artifacts));
    let hits = matcher::aggregate(raw_hits);
    let hit_count = hits.len();
    catalog.save_rule_hits(hits)?;

    // write_reports
    let mut report_paths = Vec::new();
    let json_path = config.evidence_root.join(format!("{}_internal_report.json", case_id));
    let report_payload = serde_json::json!({
        "case_id": case_id,
        "artifact_count": outcome.artifacts.len(),
        "hit_count": hit_count,
        "warnings": warnings,
    });
    match fs::write(&json_path, serde_json::to_vec_pretty(&report_payload)?) {
        Ok(()) => {
            let (sha256, _) = crate::hasher::hash_file(&json_path)?;
            catalog.save_report(&case_id, crate::model::ReportType::InternalJson, &json_path.to_string_lossy(), &sha256, "orchestrator", "ok", now)?;
            report_paths.push(json_path.to_string_lossy().into_owned());
        }
        Err(e) => warnings.push(format!("internal_json report write failed: {}", e)),
    }

    let html_path = config.evidence_root.join(format!("{}_internal_report.html", case_id));
    let html_body = format!(
        "<html><body><h1>Case {}</h1><p>{} artifacts, {} hits</p></body></html>",
        case_id,
        outcome.artifacts.len(),
        hit_count
    );
    match fs::write(&html_path, html_body) {
        Ok(()) => {
            if let Ok((sha256, _)) = crate::hasher::hash_file(&html_path) {
                let _ = catalog.save_report(&case_id, crate::model::ReportType::InternalHtml, &html_path.to_string_lossy(), &sha256, "orchestrator", "ok", now);
                report_paths.push(html_path.to_string_lossy().into_owned());
            }
        }
        Err(e) => warnings.push(format!("internal_html report write failed (best-effort): {}", e)),
    }

    // audit_finish
    let final_status = if overall_failed { "failed" } else { "success" };
    catalog.append_audit(
        &case_id,
        None,
        event_type,
        "scan_finish",
        final_status,
        &request.operator,
        "orchestrator",
        Some(&serde_json::json!({
            "artifact_count": outcome.artifacts.len(),
            "hit_count": hit_count,
            "report_paths": report_paths,
            "warnings": warnings,
        })),
        now,
    )?;

    Ok(ScanResult {
        case_id,
        status: if overall_failed { ScanStatus::Failed } else { ScanStatus::Success },
        artifact_count: outcome.artifacts.len(),
        hit_count,
        warnings,
        report_paths,
    })
}

#[allow(clippy::too_many_arguments)]
fn precheck(
    case_id: &str,
    scan_scope: ScanScope,
    code: &str,
    name: &str,
    required: bool,
    status: PrecheckStatus,
    message: &str,
    now: i64,
) -> PrecheckResult {
    let detail = serde_json::json!({"status": status_str(status), "code": code, "name": name}).to_string();
    let check_id = new_id(prefix::CHECK);
    let record_hash = crate::hasher::hash_text([case_id, code, &status_str(status).to_string(), message]);
    PrecheckResult {
        check_id,
        case_id: case_id.to_string(),
        device_id: None,
        scan_scope,
        check_code: code.to_string(),
        check_name: name.to_string(),
        required,
        status,
        message: message.to_string(),
        detail_json: detail,
        checked_at: now,
        record_hash,
    }
}

fn status_str(status: PrecheckStatus) -> &'static str {
    match status {
        PrecheckStatus::Passed => "passed",
        PrecheckStatus::Failed => "failed",
        PrecheckStatus::Skipped => "skipped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OsType;

    fn sample_device(case_id: &str) -> Device {
        Device {
            device_id: new_id(prefix::DEVICE),
            case_id: case_id.to_string(),
            os_type: OsType::Windows,
            device_name: Some("workstation".to_string()),
            identifier: None,
            connection_type: "local".to_string(),
            authorized: true,
            auth_note: None,
            first_seen_at: 1000,
            last_seen_at: 1000,
        }
    }

    #[test]
    fn external_profile_without_auth_order_aborts_fatal() {
        let catalog = Catalog::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path().join("evidence"));
        let config = OrchestratorConfig {
            evidence_root: dir.path().join("evidence"),
            db_dir: dir.path().join("db"),
            ios_backup_dir: dir.path().join("ios"),
            profile: Profile::External,
            privacy_mode: PrivacyMode::Off,
        };
        let request = ScanRequest {
            case_id: None,
            case_no: None,
            title: None,
            operator: "alice".to_string(),
            note: None,
            device: sample_device("pending"),
            scan_scope: ScanScope::Host,
            require_auth_order: true,
            authorization_order: None,
        };
        let wallet_path = dir.path().join("wallet.yaml");
        let exchange_path = dir.path().join("exchange.yaml");
        std::fs::write(&wallet_path, "version: \"1\"\nbundle_type: wallet_signatures\nrules:\n  - rule_id: x\n    name: X\n    chrome_ids: [a]\n").unwrap();
        std::fs::write(&exchange_path, "version: \"1\"\nbundle_type: exchange_domains\nrules:\n  - rule_id: y\n    name: Y\n    exact_domain: [a.com]\n").unwrap();

        let result = run_scan(&catalog, &store, &config, request, &wallet_path, &exchange_path, |_case_id| CollectorOutcome::default(), 1000);
        assert!(matches!(result, Err(CoreError::Fatal(_))));

        // The case must exist and carry a precheck-failed audit event, but no hits/artifacts.
        let cases = catalog.list_cases(10, 0).unwrap();
        assert_eq!(cases.len(), 1);
        let audits = catalog.list_audit(&cases[0].case_id).unwrap();
        assert!(audits.iter().any(|a| a.action == "precheck_failed"));
        assert!(catalog.list_artifacts(&cases[0].case_id).unwrap().is_empty());
    }
}
