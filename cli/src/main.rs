mod host;

use ctrace_core::catalog::Catalog;
use ctrace_core::collectors::{ios_backup, mobile};
use ctrace_core::collectors::CollectorOutcome;
use ctrace_core::evidence_store::EvidenceStore;
use ctrace_core::exporter;
use ctrace_core::ids::{new_id, prefix};
use ctrace_core::model::{Device, OsType, ScanScope};
use ctrace_core::orchestrator::{run_scan, OrchestratorConfig, PrivacyMode, Profile, ScanRequest, ScanStatus};
use ctrace_core::rules;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        Some("migrate") => cmd_migrate(&args[2..]),
        Some("rules") => match args.get(2).map(String::as_str) {
            Some("validate") => cmd_rules_validate(&args[3..]),
            _ => Err(usage()),
        },
        Some("scan") => match args.get(2).map(String::as_str) {
            Some("host") => cmd_scan_host(&args[3..]),
            Some("mobile") => cmd_scan_mobile(&args[3..]),
            Some("all") => cmd_scan_all(&args[3..]),
            _ => Err(usage()),
        },
        Some("query") => cmd_query(&args[2..]),
        Some("export") => match args.get(2).map(String::as_str) {
            Some("forensic-zip") => cmd_export_forensic_zip(&args[3..]),
            Some("forensic-pdf") => cmd_export_forensic_pdf(&args[3..]),
            _ => Err(usage()),
        },
        Some("verify") => match args.get(2).map(String::as_str) {
            Some("forensic-zip") => cmd_verify_forensic_zip(&args[3..]),
            Some("artifacts") => cmd_verify_artifacts(&args[3..]),
            Some("audits") => cmd_verify_audits(&args[3..]),
            _ => Err(usage()),
        },
        Some("serve") => cmd_serve(&args[2..]),
        _ => Err(usage()),
    };

    if let Err(message) = result {
        eprintln!("{}", message);
        std::process::exit(1);
    }
}

fn usage() -> String {
    "usage: ctrace <migrate|rules|scan|query|export|verify|serve> ...\n\
     \n\
     migrate <db_path>\n\
     rules validate <wallet_bundle.yaml> <exchange_bundle.yaml>\n\
     scan host <db_path> <evidence_root> <operator> [--profile internal|external] [--privacy off|masked] [--auth-order ORDER]\n\
     scan mobile <db_path> <evidence_root> <operator> <android|ios> <serial_or_udid> [--profile internal|external] [--privacy off|masked] [--auth-order ORDER] [--backup-root DIR]\n\
     scan all <db_path> <evidence_root> <operator> [--profile internal|external] [--privacy off|masked] [--auth-order ORDER]\n\
     query <db_path> <case_id> <cases|devices|artifacts|hits|audit|reports|prechecks>\n\
     export forensic-zip <db_path> <case_id> <staging_dir> <dest_zip> <wallet_bundle.yaml> <exchange_bundle.yaml>\n\
     export forensic-pdf ...\n\
     verify forensic-zip <archive_path>\n\
     verify artifacts <db_path> <case_id> [artifact_id]\n\
     verify audits <db_path> <case_id>\n\
     serve"
        .to_string()
}

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned()
}

fn cmd_migrate(args: &[String]) -> Result<(), String> {
    let db_path = args.first().ok_or_else(usage)?;
    Catalog::open(db_path).map_err(|e| format!("migrate failed: {}", e))?;
    println!("schema up to date at {}", db_path);
    Ok(())
}

fn cmd_rules_validate(args: &[String]) -> Result<(), String> {
    let wallet_path = args.first().ok_or_else(usage)?;
    let exchange_path = args.get(1).ok_or_else(usage)?;

    let wallet = rules::load_wallet_bundle(wallet_path).map_err(|e| format!("wallet bundle invalid: {}", e))?;
    let exchange = rules::load_exchange_bundle(exchange_path).map_err(|e| format!("exchange bundle invalid: {}", e))?;

    println!(
        "wallet_signatures: {} rules, sha256={}",
        wallet.file.rules.len(),
        wallet.sha256
    );
    println!(
        "exchange_domains: {} rules, sha256={}",
        exchange.file.rules.len(),
        exchange.sha256
    );
    Ok(())
}

struct ScanArgs<'a> {
    db_path: &'a str,
    evidence_root: &'a str,
    operator: &'a str,
    profile: Profile,
    privacy_mode: PrivacyMode,
    auth_order: Option<String>,
    wallet_bundle: String,
    exchange_bundle: String,
}

fn parse_scan_args<'a>(positional: &'a [String], flags: &'a [String]) -> Result<ScanArgs<'a>, String> {
    if positional.len() < 3 {
        return Err(usage());
    }
    let profile = match flag(flags, "--profile").as_deref() {
        Some("external") => Profile::External,
        _ => Profile::Internal,
    };
    let privacy_mode = PrivacyMode::parse(flag(flags, "--privacy").as_deref().unwrap_or("off"));
    let wallet_bundle = flag(flags, "--wallet-bundle").unwrap_or_else(|| "rules/wallet_signatures.yaml".to_string());
    let exchange_bundle = flag(flags, "--exchange-bundle").unwrap_or_else(|| "rules/exchange_domains.yaml".to_string());

    Ok(ScanArgs {
        db_path: &positional[0],
        evidence_root: &positional[1],
        operator: &positional[2],
        profile,
        privacy_mode,
        auth_order: flag(flags, "--auth-order"),
        wallet_bundle,
        exchange_bundle,
    })
}

fn print_scan_result(result: &ctrace_core::orchestrator::ScanResult) {
    println!("case_id={}", result.case_id);
    println!("status={}", if result.status == ScanStatus::Success { "success" } else { "failed" });
    println!("artifacts={} hits={}", result.artifact_count, result.hit_count);
    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    for path in &result.report_paths {
        println!("report: {}", path);
    }
}

fn cmd_scan_host(args: &[String]) -> Result<(), String> {
    if !host::host_os_supported() {
        return Err(format!("unsupported host OS: {}", std::env::consts::OS));
    }
    let scan = parse_scan_args(args, args)?;
    let now = now_unix();

    let catalog = Catalog::open(scan.db_path).map_err(|e| e.to_string())?;
    let store = EvidenceStore::new(scan.evidence_root);
    let config = OrchestratorConfig {
        evidence_root: Path::new(scan.evidence_root).to_path_buf(),
        db_dir: Path::new(scan.db_path).parent().unwrap_or(Path::new(".")).to_path_buf(),
        ios_backup_dir: Path::new(scan.evidence_root).join("ios_backups"),
        profile: scan.profile,
        privacy_mode: scan.privacy_mode,
    };
    let device_id = new_id(prefix::DEVICE);
    let os_type = if std::env::consts::OS == "windows" { OsType::Windows } else { OsType::Macos };
    let request = ScanRequest {
        case_id: None,
        case_no: None,
        title: None,
        operator: scan.operator.to_string(),
        note: None,
        device: Device {
            device_id: device_id.clone(),
            case_id: String::new(),
            os_type,
            device_name: std::env::var("COMPUTERNAME").or_else(|_| std::env::var("HOSTNAME")).ok(),
            identifier: None,
            connection_type: "local".to_string(),
            authorized: true,
            auth_note: None,
            first_seen_at: now,
            last_seen_at: now,
        },
        scan_scope: ScanScope::Host,
        require_auth_order: scan.profile == Profile::External,
        authorization_order: scan.auth_order.clone(),
    };

    let collector_version = env!("CARGO_PKG_VERSION");
    let result = run_scan(
        &catalog,
        &store,
        &config,
        request,
        Path::new(&scan.wallet_bundle),
        Path::new(&scan.exchange_bundle),
        |case_id| host::collect_host(&store, case_id, &device_id, collector_version, now),
        now,
    )
    .map_err(|e| e.to_string())?;
    print_scan_result(&result);
    Ok(())
}

fn cmd_scan_mobile(args: &[String]) -> Result<(), String> {
    if args.len() < 5 {
        return Err(usage());
    }
    let platform = args[3].as_str();
    let identifier = args[4].clone();
    let rest = &args[5..];
    let positional = [args[0].clone(), args[1].clone(), args[2].clone()];
    let scan = parse_scan_args(&positional, rest)?;
    let backup_root = flag(rest, "--backup-root");
    let now = now_unix();

    let catalog = Catalog::open(scan.db_path).map_err(|e| e.to_string())?;
    let store = EvidenceStore::new(scan.evidence_root);
    let config = OrchestratorConfig {
        evidence_root: Path::new(scan.evidence_root).to_path_buf(),
        db_dir: Path::new(scan.db_path).parent().unwrap_or(Path::new(".")).to_path_buf(),
        ios_backup_dir: Path::new(scan.evidence_root).join("ios_backups"),
        profile: scan.profile,
        privacy_mode: scan.privacy_mode,
    };
    let device_id = new_id(prefix::DEVICE);
    let os_type = if platform == "android" { OsType::Android } else { OsType::Ios };
    let request = ScanRequest {
        case_id: None,
        case_no: None,
        title: None,
        operator: scan.operator.to_string(),
        note: None,
        device: Device {
            device_id: device_id.clone(),
            case_id: String::new(),
            os_type,
            device_name: None,
            identifier: Some(identifier.clone()),
            connection_type: if platform == "android" { "adb".to_string() } else { "idevice".to_string() },
            authorized: true,
            auth_note: None,
            first_seen_at: now,
            last_seen_at: now,
        },
        scan_scope: ScanScope::Mobile,
        require_auth_order: scan.profile == Profile::External,
        authorization_order: scan.auth_order.clone(),
    };

    let collector_version = env!("CARGO_PKG_VERSION");
    let result = run_scan(
        &catalog,
        &store,
        &config,
        request,
        Path::new(&scan.wallet_bundle),
        Path::new(&scan.exchange_bundle),
        |case_id| {
            if platform == "android" {
                let collect_result = mobile::collect_android_packages(&store, case_id, &device_id, &identifier, "mobile_packages", collector_version, now);
                return CollectorOutcome::from_result(collect_result, "mobile_packages");
            }

            let mut outcome = CollectorOutcome::from_result(
                mobile::collect_ios_packages(&store, case_id, &device_id, &identifier, "mobile_packages", collector_version, now),
                "mobile_packages",
            );
            if let Some(backup_root) = &backup_root {
                match ios_backup::mine_ios_backup_history(&store, case_id, &device_id, Path::new(backup_root), "ios_backup_history", collector_version, now) {
                    Ok((artifacts, warnings)) => {
                        outcome.artifacts.extend(artifacts);
                        outcome.warnings.extend(warnings);
                    }
                    Err(e) => outcome.warnings.push(format!("ios_backup_history: {}", e)),
                }
            }
            outcome
        },
        now,
    )
    .map_err(|e| e.to_string())?;
    print_scan_result(&result);
    Ok(())
}

fn cmd_scan_all(args: &[String]) -> Result<(), String> {
    if !host::host_os_supported() {
        return Err(format!("unsupported host OS: {}", std::env::consts::OS));
    }
    let scan = parse_scan_args(args, args)?;
    let now = now_unix();

    let catalog = Catalog::open(scan.db_path).map_err(|e| e.to_string())?;
    let store = EvidenceStore::new(scan.evidence_root);
    let config = OrchestratorConfig {
        evidence_root: Path::new(scan.evidence_root).to_path_buf(),
        db_dir: Path::new(scan.db_path).parent().unwrap_or(Path::new(".")).to_path_buf(),
        ios_backup_dir: Path::new(scan.evidence_root).join("ios_backups"),
        profile: scan.profile,
        privacy_mode: scan.privacy_mode,
    };
    let device_id = new_id(prefix::DEVICE);
    let os_type = if std::env::consts::OS == "windows" { OsType::Windows } else { OsType::Macos };
    let request = ScanRequest {
        case_id: None,
        case_no: None,
        title: None,
        operator: scan.operator.to_string(),
        note: None,
        device: Device {
            device_id: device_id.clone(),
            case_id: String::new(),
            os_type,
            device_name: std::env::var("COMPUTERNAME").or_else(|_| std::env::var("HOSTNAME")).ok(),
            identifier: None,
            connection_type: "local".to_string(),
            authorized: true,
            auth_note: None,
            first_seen_at: now,
            last_seen_at: now,
        },
        scan_scope: ScanScope::General,
        require_auth_order: scan.profile == Profile::External,
        authorization_order: scan.auth_order.clone(),
    };

    let collector_version = env!("CARGO_PKG_VERSION");
    let result = run_scan(
        &catalog,
        &store,
        &config,
        request,
        Path::new(&scan.wallet_bundle),
        Path::new(&scan.exchange_bundle),
        |case_id| host::collect_host(&store, case_id, &device_id, collector_version, now),
        now,
    )
    .map_err(|e| e.to_string())?;
    print_scan_result(&result);
    Ok(())
}

fn cmd_query(args: &[String]) -> Result<(), String> {
    if args.len() < 3 {
        return Err(usage());
    }
    let catalog = Catalog::open(&args[0]).map_err(|e| e.to_string())?;
    let case_id = &args[1];
    let value = match args[2].as_str() {
        "cases" => serde_json::to_value(catalog.list_cases(100, 0).map_err(|e| e.to_string())?),
        "devices" => serde_json::to_value(catalog.list_devices(case_id).map_err(|e| e.to_string())?),
        "artifacts" => serde_json::to_value(catalog.list_artifacts(case_id).map_err(|e| e.to_string())?),
        "hits" => serde_json::to_value(catalog.list_rule_hits(case_id).map_err(|e| e.to_string())?),
        "audit" => serde_json::to_value(catalog.list_audit(case_id).map_err(|e| e.to_string())?),
        "reports" => serde_json::to_value(catalog.list_reports(case_id).map_err(|e| e.to_string())?),
        "prechecks" => serde_json::to_value(catalog.list_prechecks(case_id).map_err(|e| e.to_string())?),
        _ => return Err(usage()),
    }
    .map_err(|e| e.to_string())?;
    println!("{}", serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?);
    Ok(())
}

fn cmd_export_forensic_zip(args: &[String]) -> Result<(), String> {
    if args.len() < 6 {
        return Err(usage());
    }
    let catalog = Catalog::open(&args[0]).map_err(|e| e.to_string())?;
    let case_id = &args[1];
    let staging_dir = Path::new(&args[2]);
    let dest_zip = Path::new(&args[3]);
    let wallet_bundle = Path::new(&args[4]);
    let exchange_bundle = Path::new(&args[5]);

    let sha256 = exporter::build_forensic_archive(&catalog, case_id, staging_dir, dest_zip, wallet_bundle, exchange_bundle, now_unix())
        .map_err(|e| format!("export failed: {}", e))?;
    println!("archive={}", dest_zip.display());
    println!("sha256={}", sha256);
    Ok(())
}

fn cmd_export_forensic_pdf(_args: &[String]) -> Result<(), String> {
    println!("forensic-pdf export is not implemented by this engine: PDF layout is an external collaborator (see the manifest.json produced by `export forensic-zip`).");
    Ok(())
}

fn cmd_verify_forensic_zip(args: &[String]) -> Result<(), String> {
    let archive_path = args.first().ok_or_else(usage)?;
    let result = exporter::verify_archive(Path::new(archive_path)).map_err(|e| e.to_string())?;
    println!("{}", serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?);
    if result.ok {
        Ok(())
    } else {
        Err("archive verification failed".to_string())
    }
}

fn cmd_verify_artifacts(args: &[String]) -> Result<(), String> {
    if args.len() < 2 {
        return Err(usage());
    }
    let catalog = Catalog::open(&args[0]).map_err(|e| e.to_string())?;
    let only_artifact_id = args.get(2).map(String::as_str);
    let results = exporter::verify_artifacts(&catalog, &args[1], only_artifact_id).map_err(|e| e.to_string())?;
    let all_ok = results.iter().all(|r| r.status == exporter::ArchiveFileStatus::Ok);
    println!("{}", serde_json::to_string_pretty(&results).map_err(|e| e.to_string())?);
    if all_ok {
        Ok(())
    } else {
        Err("one or more artifacts failed verification".to_string())
    }
}

fn cmd_verify_audits(args: &[String]) -> Result<(), String> {
    if args.len() < 2 {
        return Err(usage());
    }
    let catalog = Catalog::open(&args[0]).map_err(|e| e.to_string())?;
    let audits = catalog.list_audit(&args[1]).map_err(|e| e.to_string())?;
    let result = ctrace_core::audit_verify::verify_chain(&audits);
    println!("{}", serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?);
    if result.ok {
        Ok(())
    } else {
        Err("audit chain verification failed".to_string())
    }
}

fn cmd_serve(_args: &[String]) -> Result<(), String> {
    println!("bind contract: HTTP/JSON service over {{migrate, rules, scan, query, export, verify}}");
    println!("this binary does not start a server; the HTTP/UI layer is an external collaborator");
    Ok(())
}
