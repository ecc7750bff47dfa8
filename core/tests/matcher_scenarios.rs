//! End-to-end matcher scenarios grounded in the documented examples:
//! a fresh host scan producing a wallet-install hit plus an exchange-visit
//! hit, and a hit-merge across two browser profiles visiting the same
//! exchange under different URLs.

use ctrace_core::matcher::{aggregate, match_exchange_domain, match_wallet_extension};
use ctrace_core::model::{Artifact, ArtifactType, HitType, Verdict};
use ctrace_core::rules::{ExchangeRule, WalletRule};

fn extension_artifact(device_id: &str, artifact_id: &str, extension_id: &str) -> Artifact {
    Artifact {
        artifact_id: artifact_id.to_string(),
        case_id: "case_1".to_string(),
        device_id: device_id.to_string(),
        artifact_type: ArtifactType::BrowserExtension,
        source_ref: "chrome_default".to_string(),
        snapshot_path: "snap.json".to_string(),
        sha256: "a".repeat(64),
        size_bytes: 10,
        collected_at: 1000,
        collector_name: "host".to_string(),
        collector_version: "1".to_string(),
        parser_version: "1".to_string(),
        acquisition_method: "file_copy".to_string(),
        payload_json: serde_json::json!({"extension_id": extension_id, "name": "MetaMask"}).to_string(),
        record_hash: "h".to_string(),
    }
}

fn history_artifact(device_id: &str, artifact_id: &str, entries: Vec<(&str, &str, &str, i64)>) -> Artifact {
    let entries_json: Vec<_> = entries
        .into_iter()
        .map(|(url, title, domain, visited_at)| serde_json::json!({"url": url, "title": title, "domain": domain, "visited_at": visited_at}))
        .collect();
    Artifact {
        artifact_id: artifact_id.to_string(),
        case_id: "case_1".to_string(),
        device_id: device_id.to_string(),
        artifact_type: ArtifactType::BrowserHistory,
        source_ref: "chrome_default".to_string(),
        snapshot_path: "snap.json".to_string(),
        sha256: "b".repeat(64),
        size_bytes: 10,
        collected_at: 1000,
        collector_name: "host".to_string(),
        collector_version: "1".to_string(),
        parser_version: "1".to_string(),
        acquisition_method: "file_copy".to_string(),
        payload_json: serde_json::json!({"entries": entries_json}).to_string(),
        record_hash: "h".to_string(),
    }
}

fn metamask_rule() -> WalletRule {
    WalletRule {
        rule_id: "metamask".to_string(),
        name: "MetaMask".to_string(),
        chrome_ids: vec!["nkbihfbeogaeaoehlefnkodbefgpgknn".to_string()],
        edge_ids: vec![],
        firefox_ids: vec![],
        app_keywords: vec![],
        file_keywords: vec![],
        aliases: vec![],
        android_package_ids: vec![],
        ios_bundle_ids: vec![],
        direct_match: Some(0.95),
        keyword_match: None,
    }
}

fn binance_rule() -> ExchangeRule {
    ExchangeRule {
        rule_id: "binance".to_string(),
        name: "Binance".to_string(),
        exact_domain: vec!["binance.com".to_string()],
        root_domain: vec!["binance.com".to_string()],
        urls_contains: vec![],
        exact_domain_confidence: Some(0.95),
        root_domain_confidence: Some(0.90),
        url_contains_confidence: None,
    }
}

#[test]
fn fresh_host_scan_yields_wallet_install_and_exchange_visit_hits() {
    let extension = extension_artifact("dev_1", "art_ext", "nkbihfbeogaeaoehlefnkodbefgpgknn");
    let history = history_artifact("dev_1", "art_hist", vec![("https://www.binance.com/en", "Binance", "www.binance.com", 1500)]);

    let wallet_hits = match_wallet_extension(&[extension], &[metamask_rule()], Some("bundle_1"), "1");
    assert_eq!(wallet_hits.len(), 1);
    assert_eq!(wallet_hits[0].hit_type, HitType::WalletInstalled);
    assert!(wallet_hits[0].confidence >= 0.90);
    assert_eq!(wallet_hits[0].verdict, Verdict::Confirmed);

    let exchange_hits = match_exchange_domain(&[history], &[binance_rule()], Some("bundle_2"), "1");
    assert_eq!(exchange_hits.len(), 1);
    assert_eq!(exchange_hits[0].hit_type, HitType::ExchangeVisited);
    assert_eq!(exchange_hits[0].matched_value, "binance.com");
}

#[test]
fn two_profiles_visiting_the_same_exchange_merge_into_one_hit() {
    let profile_a = history_artifact("dev_1", "art_profile_a", vec![("https://www.binance.com/", "Binance", "www.binance.com", 2000)]);
    let profile_b = history_artifact("dev_1", "art_profile_b", vec![("https://binance.com/spot", "Binance Spot", "binance.com", 1000)]);

    let raw_hits = match_exchange_domain(&[profile_a, profile_b], &[binance_rule()], Some("bundle_2"), "1");
    let hits = aggregate(raw_hits);

    let exchange_hits: Vec<_> = hits.iter().filter(|h| h.hit_type == HitType::ExchangeVisited).collect();
    assert_eq!(exchange_hits.len(), 1, "visits to the same exchange must merge into a single hit");

    let hit = exchange_hits[0];
    assert_eq!(hit.matched_value, "binance.com");
    assert_eq!(hit.first_seen_at, 1000, "first_seen_at must track the earlier of the two visits");
    assert_eq!(hit.last_seen_at, 2000);

    let mut artifact_ids = hit.artifact_ids.clone();
    artifact_ids.sort();
    assert_eq!(artifact_ids, vec!["art_profile_a".to_string(), "art_profile_b".to_string()]);
}
