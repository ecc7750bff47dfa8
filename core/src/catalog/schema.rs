//! Idempotent schema migrations, keyed by a monotonically increasing
//! version recorded in `schema_meta` (spec §4.4).

use crate::error::CoreResult;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

const CURRENT_VERSION: i64 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT
);

CREATE TABLE IF NOT EXISTS cases (
    case_id    TEXT PRIMARY KEY,
    case_no    TEXT,
    title      TEXT,
    status     TEXT NOT NULL,
    created_by TEXT NOT NULL,
    note       TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS devices (
    device_id       TEXT PRIMARY KEY,
    case_id         TEXT NOT NULL REFERENCES cases(case_id),
    os_type         TEXT NOT NULL,
    device_name     TEXT,
    identifier      TEXT,
    connection_type TEXT NOT NULL,
    authorized      INTEGER NOT NULL,
    auth_note       TEXT,
    first_seen_at   INTEGER NOT NULL,
    last_seen_at    INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_devices_case_identifier
    ON devices(case_id, identifier) WHERE identifier IS NOT NULL;

CREATE TABLE IF NOT EXISTS prechecks (
    check_id    TEXT PRIMARY KEY,
    case_id     TEXT NOT NULL REFERENCES cases(case_id),
    device_id   TEXT,
    scan_scope  TEXT NOT NULL,
    check_code  TEXT NOT NULL,
    check_name  TEXT NOT NULL,
    required    INTEGER NOT NULL,
    status      TEXT NOT NULL,
    message     TEXT NOT NULL,
    detail_json TEXT NOT NULL,
    checked_at  INTEGER NOT NULL,
    record_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prechecks_case ON prechecks(case_id);

CREATE TABLE IF NOT EXISTS artifacts (
    artifact_id        TEXT PRIMARY KEY,
    case_id            TEXT NOT NULL REFERENCES cases(case_id),
    device_id          TEXT NOT NULL,
    artifact_type      TEXT NOT NULL,
    source_ref         TEXT NOT NULL,
    snapshot_path      TEXT NOT NULL,
    sha256             TEXT NOT NULL,
    size_bytes         INTEGER NOT NULL,
    collected_at       INTEGER NOT NULL,
    collector_name     TEXT NOT NULL,
    collector_version  TEXT NOT NULL,
    parser_version     TEXT NOT NULL,
    acquisition_method TEXT NOT NULL,
    payload_json       TEXT NOT NULL,
    record_hash        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_artifacts_case_device ON artifacts(case_id, device_id);

CREATE TABLE IF NOT EXISTS rule_bundles (
    bundle_id   TEXT PRIMARY KEY,
    bundle_type TEXT NOT NULL,
    version     TEXT NOT NULL,
    sha256      TEXT NOT NULL,
    source_path TEXT NOT NULL,
    UNIQUE(bundle_type, sha256)
);

CREATE TABLE IF NOT EXISTS rule_hits (
    hit_id          TEXT PRIMARY KEY,
    hit_key         TEXT NOT NULL UNIQUE,
    case_id         TEXT NOT NULL REFERENCES cases(case_id),
    device_id       TEXT NOT NULL,
    hit_type        TEXT NOT NULL,
    rule_id         TEXT NOT NULL,
    rule_name       TEXT NOT NULL,
    rule_bundle_id  TEXT,
    rule_version    TEXT NOT NULL,
    matched_value   TEXT NOT NULL,
    first_seen_at   INTEGER NOT NULL,
    last_seen_at    INTEGER NOT NULL,
    confidence      REAL NOT NULL,
    verdict         TEXT NOT NULL,
    detail_json     TEXT NOT NULL,
    artifact_ids_json TEXT NOT NULL,
    os              TEXT
);
CREATE INDEX IF NOT EXISTS idx_rule_hits_case ON rule_hits(case_id);

CREATE TABLE IF NOT EXISTS reports (
    report_id    TEXT PRIMARY KEY,
    case_id      TEXT NOT NULL REFERENCES cases(case_id),
    report_type  TEXT NOT NULL,
    file_path    TEXT NOT NULL,
    sha256       TEXT NOT NULL,
    generator    TEXT NOT NULL,
    status       TEXT NOT NULL,
    generated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reports_case ON reports(case_id);

CREATE TABLE IF NOT EXISTS audit_log (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id        TEXT NOT NULL UNIQUE,
    case_id         TEXT NOT NULL,
    device_id       TEXT,
    event_type      TEXT NOT NULL,
    action          TEXT NOT NULL,
    status          TEXT NOT NULL,
    actor           TEXT NOT NULL,
    source           TEXT NOT NULL,
    detail_json     TEXT NOT NULL,
    occurred_at     INTEGER NOT NULL,
    chain_prev_hash TEXT NOT NULL,
    chain_hash      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_log_case ON audit_log(case_id);
"#;

pub fn apply_migrations(conn: &Connection) -> CoreResult<()> {
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let version: i64 = conn
        .query_row("SELECT value FROM schema_meta WHERE key = 'schema_version'", [], |row| row.get::<_, String>(0))
        .optional()?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    if version < 1 {
        info!("applying schema migration v1");
        conn.execute_batch(SCHEMA_V1)?;
        conn.execute(
            "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
            [CURRENT_VERSION.to_string()],
        )?;
    }

    debug_assert!(CURRENT_VERSION >= version);
    Ok(())
}
