//! Transactional index over all persistent state (spec §4.4). Every public
//! operation that touches more than one row goes through a single
//! transaction; `append_audit` is the only mutator of the audit chain and
//! must be called with the process-wide writer lock held (spec §5) — the
//! type itself only promises single-connection discipline, not locking.

mod schema;

use crate::audit_verify::compute_chain_hash;
use crate::canonical_json::compact_detail;
use crate::error::{CoreError, CoreResult};
use crate::ids::{new_id, prefix};
use crate::model::*;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        schema::apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Upsert; empty fields do not overwrite existing non-empty fields.
    pub fn ensure_case(
        &self,
        case_id: Option<&str>,
        case_no: Option<&str>,
        title: Option<&str>,
        operator: &str,
        note: Option<&str>,
        now: i64,
    ) -> CoreResult<String> {
        let tx = self.conn.unchecked_transaction()?;
        let id = match case_id {
            Some(id) => id.to_string(),
            None => new_id(prefix::CASE),
        };

        let existing: Option<(Option<String>, Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT case_no, title, note FROM cases WHERE case_id = ?1",
                [&id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match existing {
            Some((old_no, old_title, old_note)) => {
                let case_no = coalesce_non_empty(case_no, old_no.as_deref());
                let title = coalesce_non_empty(title, old_title.as_deref());
                let note = coalesce_non_empty(note, old_note.as_deref());
                tx.execute(
                    "UPDATE cases SET case_no = ?1, title = ?2, note = ?3, updated_at = ?4 WHERE case_id = ?5",
                    params![case_no, title, note, now, id],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO cases (case_id, case_no, title, status, created_by, note, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?6, ?6)",
                    params![id, case_no, title, operator, note, now],
                )?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    /// Unique by `(case_id, identifier)` when identifier present, else by
    /// `(case_id, device_id)`.
    pub fn upsert_device(
        &self,
        device: &Device,
    ) -> CoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let existing_id: Option<String> = if let Some(identifier) = &device.identifier {
            tx.query_row(
                "SELECT device_id FROM devices WHERE case_id = ?1 AND identifier = ?2",
                params![device.case_id, identifier],
                |row| row.get(0),
            )
            .optional()?
        } else {
            tx.query_row(
                "SELECT device_id FROM devices WHERE case_id = ?1 AND device_id = ?2",
                params![device.case_id, device.device_id],
                |row| row.get(0),
            )
            .optional()?
        };

        match existing_id {
            Some(existing_id) => {
                tx.execute(
                    "UPDATE devices SET os_type = ?1, device_name = ?2, connection_type = ?3,
                         authorized = ?4, auth_note = ?5, last_seen_at = ?6
                     WHERE device_id = ?7",
                    params![
                        device.os_type.as_str(),
                        device.device_name,
                        device.connection_type,
                        device.authorized,
                        device.auth_note,
                        device.last_seen_at,
                        existing_id,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO devices (device_id, case_id, os_type, device_name, identifier,
                         connection_type, authorized, auth_note, first_seen_at, last_seen_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        device.device_id,
                        device.case_id,
                        device.os_type.as_str(),
                        device.device_name,
                        device.identifier,
                        device.connection_type,
                        device.authorized,
                        device.auth_note,
                        device.first_seen_at,
                        device.last_seen_at,
                    ],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn save_prechecks(&self, rows: &[PrecheckResult]) -> CoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO prechecks (check_id, case_id, device_id, scan_scope, check_code,
                     check_name, required, status, message, detail_json, checked_at, record_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    row.check_id,
                    row.case_id,
                    row.device_id,
                    format!("{:?}", row.scan_scope).to_lowercase(),
                    row.check_code,
                    row.check_name,
                    row.required,
                    format!("{:?}", row.status).to_lowercase(),
                    row.message,
                    row.detail_json,
                    row.checked_at,
                    row.record_hash,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Idempotent by `artifact_id`.
    pub fn save_artifacts(&self, rows: &[Artifact]) -> CoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO artifacts (artifact_id, case_id, device_id, artifact_type, source_ref,
                     snapshot_path, sha256, size_bytes, collected_at, collector_name, collector_version,
                     parser_version, acquisition_method, payload_json, record_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    row.artifact_id,
                    row.case_id,
                    row.device_id,
                    row.artifact_type.as_str(),
                    row.source_ref,
                    row.snapshot_path,
                    row.sha256,
                    row.size_bytes,
                    row.collected_at,
                    row.collector_name,
                    row.collector_version,
                    row.parser_version,
                    row.acquisition_method,
                    row.payload_json,
                    row.record_hash,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Implements the merge rule from §3: existing hits sharing a `hit_key`
    /// are widened and merged rather than duplicated.
    pub fn save_rule_hits(&self, rows: Vec<RuleHit>) -> CoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for incoming in rows {
            let hit_key = incoming.hit_key();
            let existing: Option<RuleHit> = tx
                .query_row(
                    "SELECT hit_id, case_id, device_id, hit_type, rule_id, rule_name, rule_bundle_id,
                         rule_version, matched_value, first_seen_at, last_seen_at, confidence, verdict,
                         detail_json, artifact_ids_json, os
                     FROM rule_hits WHERE hit_key = ?1",
                    [&hit_key],
                    row_to_rule_hit,
                )
                .optional()?;

            let merged = match existing {
                Some(existing) => crate::model::merge_hits(existing, incoming),
                None => incoming,
            };

            let artifact_ids_json = serde_json::to_string(&merged.artifact_ids)?;
            tx.execute(
                "INSERT OR REPLACE INTO rule_hits (hit_id, hit_key, case_id, device_id, hit_type, rule_id,
                     rule_name, rule_bundle_id, rule_version, matched_value, first_seen_at, last_seen_at,
                     confidence, verdict, detail_json, artifact_ids_json, os)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    merged.hit_id,
                    hit_key,
                    merged.case_id,
                    merged.device_id,
                    merged.hit_type.as_str(),
                    merged.rule_id,
                    merged.rule_name,
                    merged.rule_bundle_id,
                    merged.rule_version,
                    merged.matched_value,
                    merged.first_seen_at,
                    merged.last_seen_at,
                    merged.confidence,
                    format!("{:?}", merged.verdict).to_lowercase(),
                    merged.detail_json,
                    artifact_ids_json,
                    merged.os,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Upsert by `(bundle_type, sha256)`.
    pub fn ensure_rule_bundle(&self, bundle_type: &str, version: &str, sha256: &str, path: &str) -> CoreResult<String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT bundle_id FROM rule_bundles WHERE bundle_type = ?1 AND sha256 = ?2",
                params![bundle_type, sha256],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        let id = new_id(prefix::BUNDLE);
        self.conn.execute(
            "INSERT INTO rule_bundles (bundle_id, bundle_type, version, sha256, source_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, bundle_type, version, sha256, path],
        )?;
        Ok(id)
    }

    /// Arbitrary key/value row in `schema_meta` (spec §3/§6), e.g.
    /// `active_wallet_rule_path` / `active_exchange_rule_path`.
    pub fn set_schema_meta(&self, key: &str, value: &str) -> CoreResult<()> {
        self.conn.execute(
            "INSERT INTO schema_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_schema_meta(&self, key: &str) -> CoreResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM schema_meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(CoreError::from)
    }

    pub fn get_rule_bundle_version(&self, bundle_type: &str, sha256: &str) -> CoreResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT version FROM rule_bundles WHERE bundle_type = ?1 AND sha256 = ?2",
                params![bundle_type, sha256],
                |row| row.get(0),
            )
            .optional()
            .map_err(CoreError::from)
    }

    pub fn save_report(
        &self,
        case_id: &str,
        report_type: ReportType,
        file_path: &str,
        sha256: &str,
        generator: &str,
        status: &str,
        generated_at: i64,
    ) -> CoreResult<String> {
        let id = new_id(prefix::REPORT);
        self.conn.execute(
            "INSERT INTO reports (report_id, case_id, report_type, file_path, sha256, generator, status, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![id, case_id, report_type.as_str(), file_path, sha256, generator, status, generated_at],
        )?;
        Ok(id)
    }

    /// The only mutator of the audit chain (spec §4.4 step-by-step
    /// invariant). Caller must hold the process-wide writer lock (§5).
    pub fn append_audit(
        &self,
        case_id: &str,
        device_id: Option<&str>,
        event_type: &str,
        action: &str,
        status: &str,
        actor: &str,
        source: &str,
        detail: Option<&Value>,
        occurred_at: i64,
    ) -> CoreResult<AuditLogRecord> {
        let tx = self.conn.unchecked_transaction()?;
        let detail_compact = compact_detail(detail)?;

        let prev: String = tx
            .query_row("SELECT chain_hash FROM audit_log ORDER BY seq DESC LIMIT 1", [], |row| row.get(0))
            .optional()?
            .unwrap_or_default();

        let chain_hash = compute_chain_hash(&prev, case_id, event_type, action, status, occurred_at, &detail_compact);
        let event_id = new_id(prefix::EVENT);

        tx.execute(
            "INSERT INTO audit_log (event_id, case_id, device_id, event_type, action, status, actor, source,
                 detail_json, occurred_at, chain_prev_hash, chain_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![event_id, case_id, device_id, event_type, action, status, actor, source, detail_compact, occurred_at, prev, chain_hash],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        debug!(event_type, action, status, "audit event appended");

        Ok(AuditLogRecord {
            event_id,
            case_id: case_id.to_string(),
            device_id: device_id.map(|s| s.to_string()),
            event_type: event_type.to_string(),
            action: action.to_string(),
            status: status.to_string(),
            actor: actor.to_string(),
            source: source.to_string(),
            detail_json: detail_compact,
            occurred_at,
            chain_prev_hash: prev,
            chain_hash,
            seq,
        })
    }

    pub fn list_cases(&self, limit: i64, offset: i64) -> CoreResult<Vec<Case>> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id, case_no, title, status, created_by, note, created_at, updated_at
             FROM cases ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit, offset], row_to_case)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_case(&self, case_id: &str) -> CoreResult<Option<Case>> {
        self.conn
            .query_row(
                "SELECT case_id, case_no, title, status, created_by, note, created_at, updated_at
                 FROM cases WHERE case_id = ?1",
                [case_id],
                row_to_case,
            )
            .optional()
            .map_err(CoreError::from)
    }

    pub fn list_devices(&self, case_id: &str) -> CoreResult<Vec<Device>> {
        let mut stmt = self.conn.prepare(
            "SELECT device_id, case_id, os_type, device_name, identifier, connection_type, authorized,
                 auth_note, first_seen_at, last_seen_at
             FROM devices WHERE case_id = ?1 ORDER BY first_seen_at ASC",
        )?;
        let rows = stmt
            .query_map([case_id], row_to_device)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_artifacts(&self, case_id: &str) -> CoreResult<Vec<Artifact>> {
        let mut stmt = self.conn.prepare(
            "SELECT artifact_id, case_id, device_id, artifact_type, source_ref, snapshot_path, sha256,
                 size_bytes, collected_at, collector_name, collector_version, parser_version,
                 acquisition_method, payload_json, record_hash
             FROM artifacts WHERE case_id = ?1 ORDER BY collected_at ASC",
        )?;
        let rows = stmt
            .query_map([case_id], row_to_artifact)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_rule_hits(&self, case_id: &str) -> CoreResult<Vec<RuleHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT hit_id, case_id, device_id, hit_type, rule_id, rule_name, rule_bundle_id, rule_version,
                 matched_value, first_seen_at, last_seen_at, confidence, verdict, detail_json, artifact_ids_json, os
             FROM rule_hits WHERE case_id = ?1 ORDER BY last_seen_at DESC",
        )?;
        let rows = stmt
            .query_map([case_id], row_to_rule_hit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_audit(&self, case_id: &str) -> CoreResult<Vec<AuditLogRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, case_id, device_id, event_type, action, status, actor, source, detail_json,
                 occurred_at, chain_prev_hash, chain_hash, seq
             FROM audit_log WHERE case_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([case_id], row_to_audit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_reports(&self, case_id: &str) -> CoreResult<Vec<ReportInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT report_id, case_id, report_type, file_path, sha256, generator, status, generated_at
             FROM reports WHERE case_id = ?1 ORDER BY generated_at DESC",
        )?;
        let rows = stmt
            .query_map([case_id], row_to_report)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_prechecks(&self, case_id: &str) -> CoreResult<Vec<PrecheckResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT check_id, case_id, device_id, scan_scope, check_code, check_name, required, status,
                 message, detail_json, checked_at, record_hash
             FROM prechecks WHERE case_id = ?1 ORDER BY checked_at ASC",
        )?;
        let rows = stmt
            .query_map([case_id], row_to_precheck)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn coalesce_non_empty(new: Option<&str>, old: Option<&str>) -> Option<String> {
    match new {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => old.map(|s| s.to_string()),
    }
}

fn row_to_case(row: &rusqlite::Row) -> rusqlite::Result<Case> {
    Ok(Case {
        case_id: row.get(0)?,
        case_no: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        created_by: row.get(4)?,
        note: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_device(row: &rusqlite::Row) -> rusqlite::Result<Device> {
    let os_type: String = row.get(2)?;
    Ok(Device {
        device_id: row.get(0)?,
        case_id: row.get(1)?,
        os_type: parse_os_type(&os_type),
        device_name: row.get(3)?,
        identifier: row.get(4)?,
        connection_type: row.get(5)?,
        authorized: row.get(6)?,
        auth_note: row.get(7)?,
        first_seen_at: row.get(8)?,
        last_seen_at: row.get(9)?,
    })
}

fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<Artifact> {
    let artifact_type: String = row.get(3)?;
    Ok(Artifact {
        artifact_id: row.get(0)?,
        case_id: row.get(1)?,
        device_id: row.get(2)?,
        artifact_type: parse_artifact_type(&artifact_type),
        source_ref: row.get(4)?,
        snapshot_path: row.get(5)?,
        sha256: row.get(6)?,
        size_bytes: row.get(7)?,
        collected_at: row.get(8)?,
        collector_name: row.get(9)?,
        collector_version: row.get(10)?,
        parser_version: row.get(11)?,
        acquisition_method: row.get(12)?,
        payload_json: row.get(13)?,
        record_hash: row.get(14)?,
    })
}

fn row_to_rule_hit(row: &rusqlite::Row) -> rusqlite::Result<RuleHit> {
    let hit_type: String = row.get(3)?;
    let verdict: String = row.get(12)?;
    let artifact_ids_json: String = row.get(14)?;
    let artifact_ids = serde_json::from_str(&artifact_ids_json).unwrap_or_default();
    Ok(RuleHit {
        hit_id: row.get(0)?,
        case_id: row.get(1)?,
        device_id: row.get(2)?,
        hit_type: parse_hit_type(&hit_type),
        rule_id: row.get(4)?,
        rule_name: row.get(5)?,
        rule_bundle_id: row.get(6)?,
        rule_version: row.get(7)?,
        matched_value: row.get(8)?,
        first_seen_at: row.get(9)?,
        last_seen_at: row.get(10)?,
        confidence: row.get(11)?,
        verdict: parse_verdict(&verdict),
        detail_json: row.get(13)?,
        artifact_ids,
        os: row.get(15)?,
    })
}

fn row_to_audit(row: &rusqlite::Row) -> rusqlite::Result<AuditLogRecord> {
    Ok(AuditLogRecord {
        event_id: row.get(0)?,
        case_id: row.get(1)?,
        device_id: row.get(2)?,
        event_type: row.get(3)?,
        action: row.get(4)?,
        status: row.get(5)?,
        actor: row.get(6)?,
        source: row.get(7)?,
        detail_json: row.get(8)?,
        occurred_at: row.get(9)?,
        chain_prev_hash: row.get(10)?,
        chain_hash: row.get(11)?,
        seq: row.get(12)?,
    })
}

fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<ReportInfo> {
    let report_type: String = row.get(2)?;
    Ok(ReportInfo {
        report_id: row.get(0)?,
        case_id: row.get(1)?,
        report_type: parse_report_type(&report_type),
        file_path: row.get(3)?,
        sha256: row.get(4)?,
        generator: row.get(5)?,
        status: row.get(6)?,
        generated_at: row.get(7)?,
    })
}

fn row_to_precheck(row: &rusqlite::Row) -> rusqlite::Result<PrecheckResult> {
    let scan_scope: String = row.get(3)?;
    let status: String = row.get(7)?;
    Ok(PrecheckResult {
        check_id: row.get(0)?,
        case_id: row.get(1)?,
        device_id: row.get(2)?,
        scan_scope: parse_scan_scope(&scan_scope),
        check_code: row.get(4)?,
        check_name: row.get(5)?,
        required: row.get(6)?,
        status: parse_precheck_status(&status),
        message: row.get(8)?,
        detail_json: row.get(9)?,
        checked_at: row.get(10)?,
        record_hash: row.get(11)?,
    })
}

fn parse_os_type(s: &str) -> OsType {
    match s {
        "windows" => OsType::Windows,
        "macos" => OsType::Macos,
        "android" => OsType::Android,
        _ => OsType::Ios,
    }
}

fn parse_artifact_type(s: &str) -> ArtifactType {
    match s {
        "installed_apps" => ArtifactType::InstalledApps,
        "browser_extension" => ArtifactType::BrowserExtension,
        "browser_history" => ArtifactType::BrowserHistory,
        "browser_history_db" => ArtifactType::BrowserHistoryDb,
        "mobile_packages" => ArtifactType::MobilePackages,
        "mobile_backup" => ArtifactType::MobileBackup,
        _ => ArtifactType::ChainBalance,
    }
}

fn parse_hit_type(s: &str) -> HitType {
    match s {
        "wallet_installed" => HitType::WalletInstalled,
        "exchange_visited" => HitType::ExchangeVisited,
        "wallet_address" => HitType::WalletAddress,
        _ => HitType::TokenBalance,
    }
}

fn parse_verdict(s: &str) -> Verdict {
    match s {
        "confirmed" => Verdict::Confirmed,
        "suspected" => Verdict::Suspected,
        _ => Verdict::Unsupported,
    }
}

fn parse_report_type(s: &str) -> ReportType {
    match s {
        "internal_json" => ReportType::InternalJson,
        "internal_html" => ReportType::InternalHtml,
        "forensic_zip" => ReportType::ForensicZip,
        _ => ReportType::ForensicPdf,
    }
}

fn parse_scan_scope(s: &str) -> ScanScope {
    match s {
        "host" => ScanScope::Host,
        "mobile" => ScanScope::Mobile,
        _ => ScanScope::General,
    }
}

fn parse_precheck_status(s: &str) -> PrecheckStatus {
    match s {
        "passed" => PrecheckStatus::Passed,
        "failed" => PrecheckStatus::Failed,
        _ => PrecheckStatus::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_case_preserves_non_empty_fields_on_upsert() {
        let cat = Catalog::open_in_memory().unwrap();
        let id = cat.ensure_case(None, Some("C-1"), Some("Initial"), "alice", None, 1000).unwrap();
        let id2 = cat.ensure_case(Some(&id), Some(""), None, "alice", Some("new note"), 1100).unwrap();
        assert_eq!(id, id2);
        let case = cat.get_case(&id).unwrap().unwrap();
        assert_eq!(case.case_no.as_deref(), Some("C-1"));
        assert_eq!(case.title.as_deref(), Some("Initial"));
        assert_eq!(case.note.as_deref(), Some("new note"));
    }

    #[test]
    fn append_audit_chains_sequential_events() {
        let cat = Catalog::open_in_memory().unwrap();
        let case_id = cat.ensure_case(None, None, None, "alice", None, 1000).unwrap();
        let first = cat
            .append_audit(&case_id, None, "case", "case_open", "ok", "alice", "cli", None, 1000)
            .unwrap();
        let second = cat
            .append_audit(&case_id, None, "case", "case_note", "ok", "alice", "cli", None, 1001)
            .unwrap();
        assert_eq!(first.chain_prev_hash, "");
        assert_eq!(second.chain_prev_hash, first.chain_hash);
        assert_ne!(first.chain_hash, second.chain_hash);

        let events = cat.list_audit(&case_id).unwrap();
        let verified = crate::audit_verify::verify_chain(&events);
        assert!(verified.ok);
    }

    #[test]
    fn save_rule_hits_merges_same_key() {
        let cat = Catalog::open_in_memory().unwrap();
        let case_id = cat.ensure_case(None, None, None, "alice", None, 1000).unwrap();
        let hit = RuleHit {
            hit_id: new_id(prefix::HIT),
            case_id: case_id.clone(),
            device_id: "dev_1".to_string(),
            hit_type: HitType::ExchangeVisited,
            rule_id: "binance".to_string(),
            rule_name: "Binance".to_string(),
            rule_bundle_id: None,
            rule_version: "1".to_string(),
            matched_value: "binance.com".to_string(),
            first_seen_at: 100,
            last_seen_at: 200,
            confidence: 0.9,
            verdict: Verdict::Confirmed,
            detail_json: "{}".to_string(),
            artifact_ids: ["art_1".to_string()].into_iter().collect(),
            os: None,
        };
        let mut hit2 = hit.clone();
        hit2.hit_id = new_id(prefix::HIT);
        hit2.first_seen_at = 50;
        hit2.last_seen_at = 250;
        hit2.artifact_ids = ["art_2".to_string()].into_iter().collect();

        cat.save_rule_hits(vec![hit]).unwrap();
        cat.save_rule_hits(vec![hit2]).unwrap();

        let hits = cat.list_rule_hits(&case_id).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].first_seen_at, 50);
        assert_eq!(hits[0].last_seen_at, 250);
        assert_eq!(hits[0].artifact_ids.len(), 2);
    }
}
