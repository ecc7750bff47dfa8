//! Pure audit-chain hash formula and verifier (spec §3, §4.9). Used both by
//! the catalog on append and by the exporter/verifier on an extracted
//! manifest — kept dependency-free of SQLite so it can run over any ordered
//! sequence of `AuditLogRecord`s.

use crate::canonical_json::compact_detail;
use crate::hasher::hash_text;
use crate::model::AuditLogRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `chain_hash(n) = H(prev ∥ case_id ∥ event_type ∥ action ∥ status ∥
/// decimal(occurred_at) ∥ detail_compact)`.
pub fn compute_chain_hash(
    prev: &str,
    case_id: &str,
    event_type: &str,
    action: &str,
    status: &str,
    occurred_at: i64,
    detail_compact: &str,
) -> String {
    hash_text([
        prev,
        case_id,
        event_type,
        action,
        status,
        &occurred_at.to_string(),
        detail_compact,
    ])
}

/// Re-derives the compact detail form and chain hash for a record whose
/// `detail_json` may have been pretty-printed by an exporter (spec §6's
/// "wire format" note — readers must re-compact before hashing).
pub fn recompute_for_record(record: &AuditLogRecord, prev_chain_hash: &str) -> std::io::Result<String> {
    let detail: Value = serde_json::from_str(&record.detail_json)
        .unwrap_or(Value::Object(serde_json::Map::new()));
    let compact = compact_detail(Some(&detail)).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })?;
    Ok(compute_chain_hash(
        prev_chain_hash,
        &record.case_id,
        &record.event_type,
        &record.action,
        &record.status,
        record.occurred_at,
        &compact,
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainFailure {
    pub index: usize,
    pub event_id: String,
    pub expected_prev_hash: String,
    pub actual_prev_hash: String,
    pub expected_chain_hash: String,
    pub actual_chain_hash: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerifyResult {
    pub ok: bool,
    pub total: usize,
    pub failed: usize,
    pub prev_hash_failed: usize,
    pub chain_hash_failed: usize,
    pub last_chain_hash: String,
    pub failures: Vec<ChainFailure>,
}

/// Verifies link continuity and the per-record hash over an ordered
/// sequence (spec §4.9). Always advances using the record's *stored*
/// chain_hash, even on mismatch, so later breaks keep surfacing
/// independently of earlier ones.
pub fn verify_chain(records: &[AuditLogRecord]) -> ChainVerifyResult {
    let mut running_prev = String::new();
    let mut failures = Vec::new();
    let mut prev_hash_failed = 0usize;
    let mut chain_hash_failed = 0usize;

    for (i, rec) in records.iter().enumerate() {
        let expected_prev = running_prev.clone();
        let expected_chain = recompute_for_record(rec, &expected_prev)
            .unwrap_or_else(|e| format!("ERROR:{}", e));

        let prev_ok = rec.chain_prev_hash == expected_prev;
        let chain_ok = rec.chain_hash == expected_chain;

        if !prev_ok || !chain_ok {
            if !prev_ok {
                prev_hash_failed += 1;
            }
            if !chain_ok {
                chain_hash_failed += 1;
            }
            let reason = match (prev_ok, chain_ok) {
                (false, false) => "prev_hash and chain_hash both mismatch".to_string(),
                (false, true) => "prev_hash mismatch".to_string(),
                (true, false) => "chain_hash mismatch".to_string(),
                (true, true) => unreachable!(),
            };
            failures.push(ChainFailure {
                index: i,
                event_id: rec.event_id.clone(),
                expected_prev_hash: expected_prev,
                actual_prev_hash: rec.chain_prev_hash.clone(),
                expected_chain_hash: expected_chain,
                actual_chain_hash: rec.chain_hash.clone(),
                reason,
            });
        }

        running_prev = rec.chain_hash.clone();
    }

    ChainVerifyResult {
        ok: failures.is_empty(),
        total: records.len(),
        failed: failures.len(),
        prev_hash_failed,
        chain_hash_failed,
        last_chain_hash: running_prev,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chain(n: usize) -> Vec<AuditLogRecord> {
        let mut out = Vec::new();
        let mut prev = String::new();
        for i in 0..n {
            let detail = "{}".to_string();
            let chain_hash = compute_chain_hash(&prev, "case_1", "host_scan", "scan_start", "started", 1000 + i as i64, &detail);
            out.push(AuditLogRecord {
                event_id: format!("evt_{}", i),
                case_id: "case_1".to_string(),
                device_id: None,
                event_type: "host_scan".to_string(),
                action: "scan_start".to_string(),
                status: "started".to_string(),
                actor: "system".to_string(),
                source: "orchestrator".to_string(),
                detail_json: detail,
                occurred_at: 1000 + i as i64,
                chain_prev_hash: prev.clone(),
                chain_hash: chain_hash.clone(),
                seq: i as i64,
            });
            prev = chain_hash;
        }
        out
    }

    #[test]
    fn valid_chain_verifies_clean() {
        let chain = make_chain(3);
        let result = verify_chain(&chain);
        assert!(result.ok);
        assert_eq!(result.failed, 0);
        assert_eq!(result.total, 3);
    }

    #[test]
    fn tamper_in_middle_record_surfaces_two_breaks() {
        let mut chain = make_chain(3);
        chain[1].status = "tampered".to_string();
        let result = verify_chain(&chain);
        assert!(!result.ok);
        assert!(result.failed >= 1);
        assert!(result.chain_hash_failed >= 1);
        // record 2's prev no longer matches record 1's (unchanged) stored hash... but since
        // we advance on the *stored* hash, record 2 still compares against record 1's stored
        // chain_hash, which didn't change - so only record 1 breaks here. Flip record 1's
        // stored chain_hash too, to also break record 2's prev link, mirroring scenario 2
        // in spec §8.
        chain[1].chain_hash = "deadbeef".repeat(8);
        let result2 = verify_chain(&chain);
        assert!(!result2.ok);
        assert!(result2.failed >= 2);
    }
}
