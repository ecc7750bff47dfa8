//! Deterministic rule matcher over loaded bundles and collected artifacts
//! (spec §4.6.2).

use crate::ids::{new_id, prefix};
use crate::model::{merge_hits, Artifact, ArtifactType, HitType, RuleHit, Verdict};
use crate::rules::{ExchangeRule, WalletRule};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

fn evm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)0x[0-9a-f]{40}").unwrap())
}

fn bech32_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bc1[ac-hj-np-z02-9]{25,87}").unwrap())
}

fn base58_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[13][1-9A-HJ-NP-Za-km-z]{25,34}").unwrap())
}

fn is_base58_char(c: char) -> bool {
    "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz".contains(c)
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(|x| x.as_str()).unwrap_or("").to_string()
}

/// Wallet-via-extension-id hits: case-insensitive set membership against
/// the rule's per-browser id lists.
pub fn match_wallet_extension(artifacts: &[Artifact], rules: &[WalletRule], bundle_id: Option<&str>, rule_version: &str) -> Vec<RuleHit> {
    let mut out = Vec::new();
    for artifact in artifacts.iter().filter(|a| a.artifact_type == ArtifactType::BrowserExtension) {
        let payload: Value = serde_json::from_str(&artifact.payload_json).unwrap_or(Value::Null);
        let ext_id = str_field(&payload, "extension_id").to_lowercase();
        if ext_id.is_empty() {
            continue;
        }
        for rule in rules {
            let ids_match = [&rule.chrome_ids, &rule.edge_ids, &rule.firefox_ids]
                .into_iter()
                .flatten()
                .any(|id| id.to_lowercase() == ext_id);
            if !ids_match {
                continue;
            }
            let confidence = rule.direct_match.unwrap_or(0.95);
            out.push(build_hit(
                HitType::WalletInstalled,
                &artifact.case_id,
                &artifact.device_id,
                &rule.rule_id,
                &rule.name,
                bundle_id,
                rule_version,
                &ext_id,
                artifact.collected_at,
                confidence,
                Verdict::Confirmed,
                serde_json::json!({"match": "extension_id", "artifact_id": artifact.artifact_id}),
                [artifact.artifact_id.clone()],
                None,
            ));
        }
    }
    out
}

/// Wallet-via-app-keyword hits: substring match against name/install
/// location/path.
pub fn match_wallet_keyword(artifacts: &[Artifact], rules: &[WalletRule], bundle_id: Option<&str>, rule_version: &str) -> Vec<RuleHit> {
    let mut out = Vec::new();
    for artifact in artifacts.iter().filter(|a| a.artifact_type == ArtifactType::InstalledApps) {
        let payload: Value = serde_json::from_str(&artifact.payload_json).unwrap_or(Value::Null);
        let haystack = format!(
            "{} {} {}",
            str_field(&payload, "name"),
            str_field(&payload, "install_location"),
            str_field(&payload, "path"),
        )
        .to_lowercase();

        for rule in rules {
            let keyword_match = [&rule.app_keywords, &rule.file_keywords, &rule.aliases]
                .into_iter()
                .flatten()
                .find(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()));
            let Some(keyword) = keyword_match else { continue };

            let confidence = rule.keyword_match.unwrap_or(0.7);
            let verdict = if confidence >= 0.85 { Verdict::Confirmed } else { Verdict::Suspected };
            out.push(build_hit(
                HitType::WalletInstalled,
                &artifact.case_id,
                &artifact.device_id,
                &rule.rule_id,
                &rule.name,
                bundle_id,
                rule_version,
                keyword,
                artifact.collected_at,
                confidence,
                verdict,
                serde_json::json!({"match": "app_keyword", "keyword": keyword, "artifact_id": artifact.artifact_id}),
                [artifact.artifact_id.clone()],
                None,
            ));
        }
    }
    out
}

/// Wallet-via-mobile-identifier hits: case-insensitive set membership
/// against the rule's Android package / iOS bundle id lists. Carries the
/// artifact's `os` through to the hit so the aggregation key keeps an
/// Android install and an iOS install of the same id as separate hits.
pub fn match_wallet_mobile(artifacts: &[Artifact], rules: &[WalletRule], bundle_id: Option<&str>, rule_version: &str) -> Vec<RuleHit> {
    let mut out = Vec::new();
    for artifact in artifacts.iter().filter(|a| a.artifact_type == ArtifactType::MobilePackages) {
        let payload: Value = serde_json::from_str(&artifact.payload_json).unwrap_or(Value::Null);
        let os = str_field(&payload, "os").to_lowercase();
        let package = str_field(&payload, "package").to_lowercase();
        if package.is_empty() {
            continue;
        }
        for rule in rules {
            let ids = match os.as_str() {
                "android" => &rule.android_package_ids,
                "ios" => &rule.ios_bundle_ids,
                _ => continue,
            };
            if !ids.iter().any(|id| id.to_lowercase() == package) {
                continue;
            }
            let confidence = rule.direct_match.unwrap_or(0.95);
            out.push(build_hit(
                HitType::WalletInstalled,
                &artifact.case_id,
                &artifact.device_id,
                &rule.rule_id,
                &rule.name,
                bundle_id,
                rule_version,
                &package,
                artifact.collected_at,
                confidence,
                Verdict::Confirmed,
                serde_json::json!({"match": "mobile_identifier", "os": os, "artifact_id": artifact.artifact_id}),
                [artifact.artifact_id.clone()],
                Some(os.as_str()),
            ));
        }
    }
    out
}

/// Exchange-by-domain hits: exact, then root-domain suffix, then URL
/// substring, stopping at the first positive per rule. Each artifact holds
/// one profile's full history (`entries`, per `collect_browser_history`);
/// every entry is matched independently so `first_seen_at`/`last_seen_at`
/// track the actual visit times, not the snapshot time.
pub fn match_exchange_domain(artifacts: &[Artifact], rules: &[ExchangeRule], bundle_id: Option<&str>, rule_version: &str) -> Vec<RuleHit> {
    let mut out = Vec::new();
    for artifact in artifacts.iter().filter(|a| a.artifact_type == ArtifactType::BrowserHistory) {
        let payload: Value = serde_json::from_str(&artifact.payload_json).unwrap_or(Value::Null);
        for entry in history_entries(&payload) {
            let url = str_field(entry, "url");
            let domain = str_field(entry, "domain").to_lowercase();
            if domain.is_empty() {
                continue;
            }
            let url_lower = url.to_lowercase();
            let visited_at = entry.get("visited_at").and_then(Value::as_i64).unwrap_or(artifact.collected_at);

            for rule in rules {
                let hit = if rule.exact_domain.iter().any(|d| d.to_lowercase() == domain) {
                    Some((rule.exact_domain_confidence.unwrap_or(0.95), domain.clone(), "exact_domain"))
                } else if let Some(root) = rule.root_domain.iter().find(|d| domain == d.to_lowercase() || domain.ends_with(&format!(".{}", d.to_lowercase()))) {
                    Some((rule.root_domain_confidence.unwrap_or(0.90), root.to_lowercase(), "root_domain"))
                } else if let Some(token) = rule.urls_contains.iter().find(|t| url_lower.contains(&t.to_lowercase())) {
                    Some((rule.url_contains_confidence.unwrap_or(0.70), token.to_lowercase(), "url_contains"))
                } else {
                    None
                };

                let Some((confidence, matched_value, reason)) = hit else { continue };
                out.push(build_hit(
                    HitType::ExchangeVisited,
                    &artifact.case_id,
                    &artifact.device_id,
                    &rule.rule_id,
                    &rule.name,
                    bundle_id,
                    rule_version,
                    &matched_value,
                    visited_at,
                    confidence,
                    Verdict::Confirmed,
                    serde_json::json!({"match": reason, "url": url, "artifact_id": artifact.artifact_id}),
                    [artifact.artifact_id.clone()],
                    None,
                ));
            }
        }
    }
    out
}

fn history_entries(payload: &Value) -> Vec<&Value> {
    payload.get("entries").and_then(Value::as_array).map(|v| v.iter().collect()).unwrap_or_default()
}

/// Wallet-address extraction from browser history URL and title text.
pub fn match_wallet_addresses(artifacts: &[Artifact]) -> Vec<RuleHit> {
    let mut out = Vec::new();
    for artifact in artifacts.iter().filter(|a| a.artifact_type == ArtifactType::BrowserHistory) {
        let payload: Value = serde_json::from_str(&artifact.payload_json).unwrap_or(Value::Null);
        for entry in history_entries(&payload) {
            let url = str_field(entry, "url");
            let title = str_field(entry, "title");
            let visited_at = entry.get("visited_at").and_then(Value::as_i64).unwrap_or(artifact.collected_at);
            let text = format!("{} {}", url, title);

            for m in evm_regex().find_iter(&text) {
                out.push(address_hit(artifact, m.as_str(), 0.80, "evm", visited_at));
            }
            for m in bech32_regex().find_iter(&text) {
                out.push(address_hit(artifact, m.as_str(), 0.85, "bech32", visited_at));
            }
            for m in base58_regex().find_iter(&text) {
                let before_ok = m.start() == 0 || !text[..m.start()].chars().last().map(is_base58_char).unwrap_or(false);
                let after_ok = m.end() == text.len() || !text[m.end()..].chars().next().map(is_base58_char).unwrap_or(false);
                if before_ok && after_ok {
                    out.push(address_hit(artifact, m.as_str(), 0.80, "base58", visited_at));
                }
            }
        }
    }
    out
}

fn address_hit(artifact: &Artifact, matched: &str, confidence: f64, kind: &str, visited_at: i64) -> RuleHit {
    build_hit(
        HitType::WalletAddress,
        &artifact.case_id,
        &artifact.device_id,
        kind,
        kind,
        None,
        "1",
        matched,
        visited_at,
        confidence,
        Verdict::Suspected,
        serde_json::json!({"match": kind, "artifact_id": artifact.artifact_id}),
        [artifact.artifact_id.clone()],
        None,
    )
}

#[allow(clippy::too_many_arguments)]
fn build_hit(
    hit_type: HitType,
    case_id: &str,
    device_id: &str,
    rule_id: &str,
    rule_name: &str,
    bundle_id: Option<&str>,
    rule_version: &str,
    matched_value: &str,
    seen_at: i64,
    confidence: f64,
    verdict: Verdict,
    detail: Value,
    artifact_ids: impl IntoIterator<Item = String>,
    os: Option<&str>,
) -> RuleHit {
    RuleHit {
        hit_id: new_id(prefix::HIT),
        case_id: case_id.to_string(),
        device_id: device_id.to_string(),
        hit_type,
        rule_id: rule_id.to_string(),
        rule_name: rule_name.to_string(),
        rule_bundle_id: bundle_id.map(|s| s.to_string()),
        rule_version: rule_version.to_string(),
        matched_value: matched_value.to_string(),
        first_seen_at: seen_at,
        last_seen_at: seen_at,
        confidence,
        verdict,
        detail_json: detail.to_string(),
        artifact_ids: artifact_ids.into_iter().collect(),
        os: os.map(|s| s.to_string()),
    }
}

/// Aggregates raw matcher output by `hit_key`, then sorts by
/// `(hit_type, matched_value)` with `artifact_ids` sorted ascending.
pub fn aggregate(hits: Vec<RuleHit>) -> Vec<RuleHit> {
    let mut by_key: HashMap<String, RuleHit> = HashMap::new();
    for hit in hits {
        let key = hit.hit_key();
        match by_key.remove(&key) {
            Some(existing) => {
                by_key.insert(key, merge_hits(existing, hit));
            }
            None => {
                by_key.insert(key, hit);
            }
        }
    }
    let mut out: Vec<RuleHit> = by_key.into_values().collect();
    out.sort_by(|a, b| (a.hit_type as u8, &a.matched_value).cmp(&(b.hit_type as u8, &b.matched_value)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_artifact(url: &str, title: &str, domain: &str) -> Artifact {
        Artifact {
            artifact_id: "art_1".to_string(),
            case_id: "case_1".to_string(),
            device_id: "dev_1".to_string(),
            artifact_type: ArtifactType::BrowserHistory,
            source_ref: "chrome".to_string(),
            snapshot_path: "snap.json".to_string(),
            sha256: "x".repeat(64),
            size_bytes: 10,
            collected_at: 1000,
            collector_name: "collector".to_string(),
            collector_version: "1".to_string(),
            parser_version: "1".to_string(),
            acquisition_method: "copy".to_string(),
            payload_json: serde_json::json!({
                "entries": [{"url": url, "title": title, "domain": domain, "visited_at": 1000}],
            })
            .to_string(),
            record_hash: "h".to_string(),
        }
    }

    #[test]
    fn extracts_evm_address_from_url() {
        let a = history_artifact("https://etherscan.io/address/0x1234567890abcdef1234567890ABCDEF12345678", "", "etherscan.io");
        let hits = match_wallet_addresses(&[a]);
        assert!(hits.iter().any(|h| h.hit_type == HitType::WalletAddress && h.confidence == 0.80));
    }

    #[test]
    fn base58_rejects_substring_inside_bech32() {
        let a = history_artifact("bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh plus 1BoatSLRHtKNngkdXEeobR76b53LETtpyT", "", "example.com");
        let hits = match_wallet_addresses(&[a]);
        let base58_hits: Vec<_> = hits.iter().filter(|h| h.confidence == 0.80 && !h.matched_value.starts_with("0x")).collect();
        assert!(base58_hits.iter().any(|h| h.matched_value == "1BoatSLRHtKNngkdXEeobR76b53LETtpyT"));
    }

    #[test]
    fn mobile_match_keeps_android_and_ios_hits_separate() {
        let rule = WalletRule {
            rule_id: "trust_wallet".to_string(),
            name: "Trust Wallet".to_string(),
            chrome_ids: vec![],
            edge_ids: vec![],
            firefox_ids: vec![],
            app_keywords: vec![],
            file_keywords: vec![],
            aliases: vec![],
            android_package_ids: vec!["com.wallet.crypto.trustapp".to_string()],
            ios_bundle_ids: vec!["com.trustwallet.trust".to_string()],
            direct_match: None,
            keyword_match: None,
        };
        let android = mobile_artifact("android", "com.wallet.crypto.trustapp");
        let ios = mobile_artifact("ios", "com.trustwallet.trust");
        let hits = match_wallet_mobile(&[android, ios], &[rule], None, "1");
        assert_eq!(hits.len(), 2);
        let aggregated = aggregate(hits);
        assert_eq!(aggregated.len(), 2, "android and ios installs must not collapse into one hit");
    }

    fn mobile_artifact(os: &str, package: &str) -> Artifact {
        Artifact {
            artifact_id: format!("art_{}", os),
            case_id: "case_1".to_string(),
            device_id: "dev_1".to_string(),
            artifact_type: ArtifactType::MobilePackages,
            source_ref: package.to_string(),
            snapshot_path: "snap.json".to_string(),
            sha256: "x".repeat(64),
            size_bytes: 10,
            collected_at: 1000,
            collector_name: "collector".to_string(),
            collector_version: "1".to_string(),
            parser_version: "1".to_string(),
            acquisition_method: "copy".to_string(),
            payload_json: serde_json::json!({"os": os, "identifier": "dev", "package": package}).to_string(),
            record_hash: "h".to_string(),
        }
    }

    #[test]
    fn exchange_domain_exact_beats_substring() {
        let rule = ExchangeRule {
            rule_id: "binance".to_string(),
            name: "Binance".to_string(),
            exact_domain: vec!["binance.com".to_string()],
            root_domain: vec![],
            urls_contains: vec!["binance".to_string()],
            exact_domain_confidence: None,
            root_domain_confidence: None,
            url_contains_confidence: None,
        };
        let a = history_artifact("https://binance.com/trade", "Binance", "binance.com");
        let hits = match_exchange_domain(&[a], &[rule], None, "1");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].confidence, 0.95);
    }
}
