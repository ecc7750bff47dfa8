//! Entities and essential attributes (spec §3). Timestamps are integer
//! seconds since the Unix epoch; digests are lowercase-hex SHA-256.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Windows,
    Macos,
    Android,
    Ios,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows => "windows",
            OsType::Macos => "macos",
            OsType::Android => "android",
            OsType::Ios => "ios",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: String,
    pub case_no: Option<String>,
    pub title: Option<String>,
    pub status: String,
    pub created_by: String,
    pub note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub case_id: String,
    pub os_type: OsType,
    pub device_name: Option<String>,
    pub identifier: Option<String>,
    pub connection_type: String,
    pub authorized: bool,
    pub auth_note: Option<String>,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanScope {
    General,
    Host,
    Mobile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecheckStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckResult {
    pub check_id: String,
    pub case_id: String,
    pub device_id: Option<String>,
    pub scan_scope: ScanScope,
    pub check_code: String,
    pub check_name: String,
    pub required: bool,
    pub status: PrecheckStatus,
    pub message: String,
    pub detail_json: String,
    pub checked_at: i64,
    pub record_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    InstalledApps,
    BrowserExtension,
    BrowserHistory,
    BrowserHistoryDb,
    MobilePackages,
    MobileBackup,
    ChainBalance,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::InstalledApps => "installed_apps",
            ArtifactType::BrowserExtension => "browser_extension",
            ArtifactType::BrowserHistory => "browser_history",
            ArtifactType::BrowserHistoryDb => "browser_history_db",
            ArtifactType::MobilePackages => "mobile_packages",
            ArtifactType::MobileBackup => "mobile_backup",
            ArtifactType::ChainBalance => "chain_balance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub case_id: String,
    pub device_id: String,
    pub artifact_type: ArtifactType,
    pub source_ref: String,
    pub snapshot_path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub collected_at: i64,
    pub collector_name: String,
    pub collector_version: String,
    pub parser_version: String,
    pub acquisition_method: String,
    pub payload_json: String,
    pub record_hash: String,
}

impl Artifact {
    /// SHA-256 over the identifying fields plus file digest and payload
    /// (spec §3 "Record hash rule"). Stable across re-reads.
    pub fn compute_record_hash(&self) -> String {
        crate::hasher::hash_text([
            self.case_id.as_str(),
            self.device_id.as_str(),
            self.artifact_type.as_str(),
            self.source_ref.as_str(),
            self.sha256.as_str(),
            &self.size_bytes.to_string(),
            self.payload_json.as_str(),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitType {
    WalletInstalled,
    ExchangeVisited,
    WalletAddress,
    TokenBalance,
}

impl HitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitType::WalletInstalled => "wallet_installed",
            HitType::ExchangeVisited => "exchange_visited",
            HitType::WalletAddress => "wallet_address",
            HitType::TokenBalance => "token_balance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Confirmed,
    Suspected,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleHit {
    pub hit_id: String,
    pub case_id: String,
    pub device_id: String,
    pub hit_type: HitType,
    pub rule_id: String,
    pub rule_name: String,
    pub rule_bundle_id: Option<String>,
    pub rule_version: String,
    pub matched_value: String,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
    pub confidence: f64,
    pub verdict: Verdict,
    pub detail_json: String,
    pub artifact_ids: BTreeSet<String>,
    /// Present only for mobile-sourced hits; extends the aggregation key so
    /// the same package id on Android and iOS doesn't collapse into one hit.
    pub os: Option<String>,
}

impl RuleHit {
    /// Aggregation key from spec §3/§4.6.2: `lower(hit_type|device_id|rule_id|matched_value[|os])`.
    pub fn hit_key(&self) -> String {
        let mut key = format!(
            "{}|{}|{}|{}",
            self.hit_type.as_str(),
            self.device_id,
            self.rule_id,
            self.matched_value
        );
        if let Some(os) = &self.os {
            key.push('|');
            key.push_str(os);
        }
        key.to_lowercase()
    }
}

/// Pure merge of two observations of the same hit (spec §3, §4.6.2, §9).
/// first/last seen widen, the higher-confidence detail/verdict wins, and
/// artifact sets union.
pub fn merge_hits(a: RuleHit, b: RuleHit) -> RuleHit {
    debug_assert_eq!(a.hit_key(), b.hit_key());
    let (higher, lower) = if b.confidence > a.confidence { (b, a) } else { (a, b) };
    let mut artifact_ids = higher.artifact_ids.clone();
    artifact_ids.extend(lower.artifact_ids.iter().cloned());
    RuleHit {
        hit_id: higher.hit_id,
        case_id: higher.case_id,
        device_id: higher.device_id,
        hit_type: higher.hit_type,
        rule_id: higher.rule_id,
        rule_name: higher.rule_name,
        rule_bundle_id: higher.rule_bundle_id,
        rule_version: higher.rule_version,
        matched_value: higher.matched_value,
        first_seen_at: higher.first_seen_at.min(lower.first_seen_at),
        last_seen_at: higher.last_seen_at.max(lower.last_seen_at),
        confidence: higher.confidence,
        verdict: higher.verdict,
        detail_json: higher.detail_json,
        artifact_ids,
        os: higher.os,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    InternalJson,
    InternalHtml,
    ForensicZip,
    ForensicPdf,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::InternalJson => "internal_json",
            ReportType::InternalHtml => "internal_html",
            ReportType::ForensicZip => "forensic_zip",
            ReportType::ForensicPdf => "forensic_pdf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInfo {
    pub report_id: String,
    pub case_id: String,
    pub report_type: ReportType,
    pub file_path: String,
    pub sha256: String,
    pub generator: String,
    pub status: String,
    pub generated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub event_id: String,
    pub case_id: String,
    pub device_id: Option<String>,
    pub event_type: String,
    pub action: String,
    pub status: String,
    pub actor: String,
    pub source: String,
    pub detail_json: String,
    pub occurred_at: i64,
    pub chain_prev_hash: String,
    pub chain_hash: String,
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBundleRecord {
    pub bundle_id: String,
    pub bundle_type: String,
    pub version: String,
    pub sha256: String,
    pub source_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(device: &str, value: &str, confidence: f64, first: i64, last: i64, artifacts: &[&str]) -> RuleHit {
        RuleHit {
            hit_id: "hit_x".to_string(),
            case_id: "case_1".to_string(),
            device_id: device.to_string(),
            hit_type: HitType::ExchangeVisited,
            rule_id: "binance".to_string(),
            rule_name: "Binance".to_string(),
            rule_bundle_id: None,
            rule_version: "1".to_string(),
            matched_value: value.to_string(),
            first_seen_at: first,
            last_seen_at: last,
            confidence: confidence,
            verdict: Verdict::Confirmed,
            detail_json: "{}".to_string(),
            artifact_ids: artifacts.iter().map(|s| s.to_string()).collect(),
            os: None,
        }
    }

    #[test]
    fn merge_widens_seen_window_and_unions_artifacts() {
        let a = hit("dev_1", "binance.com", 0.95, 100, 200, &["art_1"]);
        let b = hit("dev_1", "binance.com", 0.95, 50, 150, &["art_2"]);
        let m = merge_hits(a, b);
        assert_eq!(m.first_seen_at, 50);
        assert_eq!(m.last_seen_at, 200);
        assert_eq!(m.artifact_ids.len(), 2);
    }

    #[test]
    fn merge_keeps_higher_confidence_detail() {
        let mut a = hit("dev_1", "binance.com", 0.70, 100, 200, &["art_1"]);
        a.detail_json = "low".to_string();
        let mut b = hit("dev_1", "binance.com", 0.95, 50, 150, &["art_2"]);
        b.detail_json = "high".to_string();
        let m = merge_hits(a, b);
        assert_eq!(m.detail_json, "high");
        assert_eq!(m.confidence, 0.95);
    }
}
