//! Host-platform collector wiring: turns `LOCALAPPDATA`/`APPDATA`/`HOME`
//! into the profile paths the `core` collectors expect. This glue lives
//! here rather than in `ctrace_core` because it is the one place that
//! actually knows which OS it is running on.

use ctrace_core::collectors::history::BrowserKind;
use ctrace_core::collectors::{extensions, history, windows, macos, CollectorOutcome};
use ctrace_core::evidence_store::EvidenceStore;
use std::path::{Path, PathBuf};

pub fn host_os_supported() -> bool {
    matches!(std::env::consts::OS, "windows" | "macos")
}

pub fn collect_host(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    collector_version: &str,
    now: i64,
) -> CollectorOutcome {
    match std::env::consts::OS {
        "windows" => collect_windows(store, case_id, device_id, collector_version, now),
        "macos" => collect_macos(store, case_id, device_id, collector_version, now),
        other => {
            let mut outcome = CollectorOutcome::default();
            outcome.warnings.push(format!("unsupported host OS: {}", other));
            outcome
        }
    }
}

fn collect_windows(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    collector_version: &str,
    now: i64,
) -> CollectorOutcome {
    let mut outcome = CollectorOutcome::default();

    outcome.merge(CollectorOutcome::from_result(
        windows::collect_installed_apps(store, case_id, device_id, "windows_installed_apps", collector_version, now),
        "windows_installed_apps",
    ));

    let local_appdata = std::env::var("LOCALAPPDATA").ok().map(PathBuf::from);
    let appdata = std::env::var("APPDATA").ok().map(PathBuf::from);

    if let Some(local_appdata) = &local_appdata {
        for (browser, rel) in [("chrome", "Google/Chrome/User Data/Default"), ("edge", "Microsoft/Edge/User Data/Default")] {
            let profile_dir = local_appdata.join(rel);
            collect_chromium_profile(store, case_id, device_id, &profile_dir, browser, collector_version, now, &mut outcome);
        }
    } else {
        outcome.warnings.push("LOCALAPPDATA not set; skipping Chromium-family profiles".to_string());
    }

    if let Some(appdata) = &appdata {
        collect_gecko_profiles(store, case_id, device_id, &appdata.join("Mozilla/Firefox/Profiles"), collector_version, now, &mut outcome);
    } else {
        outcome.warnings.push("APPDATA not set; skipping Firefox profiles".to_string());
    }

    outcome
}

fn collect_macos(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    collector_version: &str,
    now: i64,
) -> CollectorOutcome {
    let mut outcome = CollectorOutcome::default();

    let Some(home) = std::env::var("HOME").ok().map(PathBuf::from) else {
        outcome.warnings.push("HOME not set; skipping macOS profile discovery".to_string());
        return outcome;
    };

    outcome.merge(CollectorOutcome::from_result(
        macos::collect_installed_apps(store, case_id, device_id, &[Path::new("/Applications"), &home.join("Applications")], "macos_installed_apps", collector_version, now),
        "macos_installed_apps",
    ));

    let chrome_profile = home.join("Library/Application Support/Google/Chrome/Default");
    collect_chromium_profile(store, case_id, device_id, &chrome_profile, "chrome", collector_version, now, &mut outcome);

    let safari_history = home.join("Library/Safari/History.db");
    collect_history(store, case_id, device_id, BrowserKind::Safari, "safari", &safari_history, collector_version, now, &mut outcome);

    collect_gecko_profiles(store, case_id, device_id, &home.join("Library/Application Support/Firefox/Profiles"), collector_version, now, &mut outcome);

    outcome
}

fn collect_chromium_profile(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    profile_dir: &Path,
    browser_label: &str,
    collector_version: &str,
    now: i64,
    outcome: &mut CollectorOutcome,
) {
    if !profile_dir.is_dir() {
        return;
    }
    outcome.merge(CollectorOutcome::from_result(
        extensions::scan_chromium_extensions(store, case_id, device_id, profile_dir, "browser_extensions", collector_version, now),
        &format!("{}_extensions", browser_label),
    ));
    collect_history(store, case_id, device_id, BrowserKind::Chromium, browser_label, &profile_dir.join("History"), collector_version, now, outcome);
}

fn collect_gecko_profiles(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    profiles_root: &Path,
    collector_version: &str,
    now: i64,
    outcome: &mut CollectorOutcome,
) {
    let Ok(entries) = std::fs::read_dir(profiles_root) else { return };
    for entry in entries.flatten() {
        let profile_dir = entry.path();
        if !profile_dir.is_dir() {
            continue;
        }
        let profile_label = format!("firefox_{}", entry.file_name().to_string_lossy());
        outcome.merge(CollectorOutcome::from_result(
            extensions::scan_gecko_extensions(store, case_id, device_id, &profile_dir, "browser_extensions", collector_version, now),
            &format!("{}_extensions", profile_label),
        ));
        collect_history(store, case_id, device_id, BrowserKind::Gecko, &profile_label, &profile_dir.join("places.sqlite"), collector_version, now, outcome);
    }
}

fn collect_history(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    kind: BrowserKind,
    profile_label: &str,
    live_db_path: &Path,
    collector_version: &str,
    now: i64,
    outcome: &mut CollectorOutcome,
) {
    if !live_db_path.is_file() {
        return;
    }
    outcome.merge(CollectorOutcome::from_result(
        history::collect_browser_history(store, case_id, device_id, kind, profile_label, live_db_path, "browser_history", collector_version, now),
        &format!("{}_history", profile_label),
    ));
}
