//! Wallet-signature and exchange-domain rule bundle loading (spec §4.6.1).
//! Validation is total: any structural defect fails the whole load rather
//! than skipping the offending rule.

use crate::error::{CoreError, CoreResult};
use crate::hasher::hash_file;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletRule {
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub chrome_ids: Vec<String>,
    #[serde(default)]
    pub edge_ids: Vec<String>,
    #[serde(default)]
    pub firefox_ids: Vec<String>,
    #[serde(default)]
    pub app_keywords: Vec<String>,
    #[serde(default)]
    pub file_keywords: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub android_package_ids: Vec<String>,
    #[serde(default)]
    pub ios_bundle_ids: Vec<String>,
    pub direct_match: Option<f64>,
    pub keyword_match: Option<f64>,
}

impl WalletRule {
    fn has_matcher_field(&self) -> bool {
        !self.chrome_ids.is_empty()
            || !self.edge_ids.is_empty()
            || !self.firefox_ids.is_empty()
            || !self.app_keywords.is_empty()
            || !self.file_keywords.is_empty()
            || !self.aliases.is_empty()
            || !self.android_package_ids.is_empty()
            || !self.ios_bundle_ids.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeRule {
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub exact_domain: Vec<String>,
    #[serde(default)]
    pub root_domain: Vec<String>,
    #[serde(default)]
    pub urls_contains: Vec<String>,
    pub exact_domain_confidence: Option<f64>,
    pub root_domain_confidence: Option<f64>,
    pub url_contains_confidence: Option<f64>,
}

impl ExchangeRule {
    fn has_matcher_field(&self) -> bool {
        !self.exact_domain.is_empty() || !self.root_domain.is_empty() || !self.urls_contains.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletBundleFile {
    pub version: String,
    pub bundle_type: String,
    pub rules: Vec<WalletRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeBundleFile {
    pub version: String,
    pub bundle_type: String,
    pub rules: Vec<ExchangeRule>,
}

pub struct LoadedWalletBundle {
    pub file: WalletBundleFile,
    pub sha256: String,
    pub source_path: String,
}

pub struct LoadedExchangeBundle {
    pub file: ExchangeBundleFile,
    pub sha256: String,
    pub source_path: String,
}

pub fn load_wallet_bundle(path: impl AsRef<Path>) -> CoreResult<LoadedWalletBundle> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let file: WalletBundleFile = serde_yaml::from_str(&text)?;

    validate_header(&file.version, &file.bundle_type)?;
    if file.rules.is_empty() {
        return Err(CoreError::InputInvalid("wallet bundle has no rules".to_string()));
    }
    check_duplicate_ids(file.rules.iter().map(|r| r.rule_id.as_str()))?;
    for rule in &file.rules {
        if !rule.has_matcher_field() {
            return Err(CoreError::InputInvalid(format!(
                "wallet rule '{}' has no matcher field",
                rule.rule_id
            )));
        }
    }

    let (sha256, _) = hash_file(path)?;
    Ok(LoadedWalletBundle {
        file,
        sha256,
        source_path: path.to_string_lossy().into_owned(),
    })
}

pub fn load_exchange_bundle(path: impl AsRef<Path>) -> CoreResult<LoadedExchangeBundle> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let file: ExchangeBundleFile = serde_yaml::from_str(&text)?;

    validate_header(&file.version, &file.bundle_type)?;
    if file.rules.is_empty() {
        return Err(CoreError::InputInvalid("exchange bundle has no rules".to_string()));
    }
    check_duplicate_ids(file.rules.iter().map(|r| r.rule_id.as_str()))?;
    for rule in &file.rules {
        if !rule.has_matcher_field() {
            return Err(CoreError::InputInvalid(format!(
                "exchange rule '{}' has no matcher field",
                rule.rule_id
            )));
        }
    }

    let (sha256, _) = hash_file(path)?;
    Ok(LoadedExchangeBundle {
        file,
        sha256,
        source_path: path.to_string_lossy().into_owned(),
    })
}

fn validate_header(version: &str, bundle_type: &str) -> CoreResult<()> {
    if version.is_empty() {
        return Err(CoreError::InputInvalid("rule bundle missing version".to_string()));
    }
    if bundle_type.is_empty() {
        return Err(CoreError::InputInvalid("rule bundle missing bundle_type".to_string()));
    }
    Ok(())
}

fn check_duplicate_ids<'a>(ids: impl Iterator<Item = &'a str>) -> CoreResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CoreError::InputInvalid(format!("duplicate rule id '{}'", id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn rejects_empty_rule_list() {
        let f = write_temp("version: \"1\"\nbundle_type: wallet_signature\nrules: []\n");
        let err = load_wallet_bundle(f.path()).unwrap_err();
        assert!(matches!(err, CoreError::InputInvalid(_)));
    }

    #[test]
    fn rejects_duplicate_rule_ids() {
        let f = write_temp(
            "version: \"1\"\nbundle_type: wallet_signature\nrules:\n  - rule_id: metamask\n    name: MetaMask\n    chrome_ids: [abc]\n  - rule_id: metamask\n    name: MetaMask2\n    chrome_ids: [def]\n",
        );
        let err = load_wallet_bundle(f.path()).unwrap_err();
        assert!(matches!(err, CoreError::InputInvalid(_)));
    }

    #[test]
    fn rejects_rule_with_no_matcher_field() {
        let f = write_temp(
            "version: \"1\"\nbundle_type: wallet_signature\nrules:\n  - rule_id: empty\n    name: Empty\n",
        );
        let err = load_wallet_bundle(f.path()).unwrap_err();
        assert!(matches!(err, CoreError::InputInvalid(_)));
    }

    #[test]
    fn loads_valid_bundle_and_returns_digest() {
        let f = write_temp(
            "version: \"1\"\nbundle_type: wallet_signature\nrules:\n  - rule_id: metamask\n    name: MetaMask\n    chrome_ids: [nkbihfbeogaeaoehlefnkodbefgpgknn]\n",
        );
        let loaded = load_wallet_bundle(f.path()).unwrap();
        assert_eq!(loaded.file.rules.len(), 1);
        assert_eq!(loaded.sha256.len(), 64);
    }
}
