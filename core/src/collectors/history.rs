//! Browser history collection shared by the Windows and macOS collectors
//! (spec §4.5.1).

use super::epoch::{chromium_to_unix_seconds, gecko_to_unix_seconds, safari_to_unix_seconds};
use crate::error::CoreResult;
use crate::evidence_store::{safe_copy_sqlite, zip_sqlite_snapshot, EvidenceStore};
use crate::ids::{new_id, prefix};
use crate::model::{Artifact, ArtifactType};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chromium,
    Gecko,
    Safari,
}

pub struct HistoryRecord {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub visited_at: i64,
}

fn normalize_domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let stripped = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

fn query_chromium(conn: &Connection, now: i64) -> CoreResult<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT urls.url, urls.title, visits.visit_time
         FROM urls JOIN visits ON urls.id = visits.url
         ORDER BY visits.visit_time DESC LIMIT 1500",
    )?;
    let rows = stmt.query_map([], |row| {
        let url: String = row.get(0)?;
        let title: String = row.get(1).unwrap_or_default();
        let visit_time: i64 = row.get(2)?;
        Ok((url, title, visit_time))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (url, title, visit_time) = row?;
        let Some(domain) = normalize_domain(&url) else { continue };
        out.push(HistoryRecord {
            url: url.trim().to_string(),
            title,
            domain,
            visited_at: chromium_to_unix_seconds(visit_time, now),
        });
    }
    Ok(out)
}

fn query_gecko(conn: &Connection, now: i64) -> CoreResult<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT url, title, last_visit_date FROM moz_places
         WHERE last_visit_date IS NOT NULL
         ORDER BY last_visit_date DESC LIMIT 1500",
    )?;
    let rows = stmt.query_map([], |row| {
        let url: String = row.get(0)?;
        let title: Option<String> = row.get(1)?;
        let last_visit: i64 = row.get(2)?;
        Ok((url, title.unwrap_or_default(), last_visit))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (url, title, last_visit) = row?;
        let Some(domain) = normalize_domain(&url) else { continue };
        out.push(HistoryRecord {
            url: url.trim().to_string(),
            title,
            domain,
            visited_at: gecko_to_unix_seconds(last_visit, now),
        });
    }
    Ok(out)
}

fn query_safari(conn: &Connection, now: i64) -> CoreResult<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT history_items.url, history_visits.title, history_visits.visit_time
         FROM history_items JOIN history_visits ON history_items.id = history_visits.history_item
         ORDER BY history_visits.visit_time DESC LIMIT 1500",
    )?;
    let rows = stmt.query_map([], |row| {
        let url: String = row.get(0)?;
        let title: Option<String> = row.get(1)?;
        let visit_time: f64 = row.get(2)?;
        Ok((url, title.unwrap_or_default(), visit_time))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (url, title, visit_time) = row?;
        let Some(domain) = normalize_domain(&url) else { continue };
        out.push(HistoryRecord {
            url: url.trim().to_string(),
            title,
            domain,
            visited_at: safari_to_unix_seconds(visit_time, now),
        });
    }
    Ok(out)
}

/// Collects one profile's history: copies the live db + sidecars, queries
/// it, deduplicates, and emits a `browser_history` artifact plus a
/// `browser_history_db` zip artifact wrapping the copy.
#[allow(clippy::too_many_arguments)]
pub fn collect_browser_history(
    store: &EvidenceStore,
    case_id: &str,
    device_id: &str,
    kind: BrowserKind,
    profile_label: &str,
    live_db_path: &Path,
    collector_name: &str,
    collector_version: &str,
    now: i64,
) -> CoreResult<Vec<Artifact>> {
    let copied = match safe_copy_sqlite(live_db_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(profile = profile_label, error = %e, "history db copy failed");
            return Err(e);
        }
    };

    let conn = Connection::open(&copied.base_path)?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    let records = match kind {
        BrowserKind::Chromium => query_chromium(&conn, now)?,
        BrowserKind::Gecko => query_gecko(&conn, now)?,
        BrowserKind::Safari => query_safari(&conn, now)?,
    };
    drop(conn);

    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for record in records {
        let key = (profile_label.to_string(), record.url.clone(), record.visited_at);
        if seen.insert(key) {
            deduped.push(record);
        }
    }

    let payload = serde_json::json!({
        "browser": format!("{:?}", kind).to_lowercase(),
        "profile": profile_label,
        "entries": deduped.iter().map(|r| serde_json::json!({
            "url": r.url, "title": r.title, "domain": r.domain, "visited_at": r.visited_at,
        })).collect::<Vec<_>>(),
    });

    let (snapshot_path, sha256, size_bytes) =
        store.write_json_snapshot(case_id, device_id, ArtifactType::BrowserHistory.as_str(), profile_label, now, &payload)?;

    let history_artifact = Artifact {
        artifact_id: new_id(prefix::ARTIFACT),
        case_id: case_id.to_string(),
        device_id: device_id.to_string(),
        artifact_type: ArtifactType::BrowserHistory,
        source_ref: profile_label.to_string(),
        snapshot_path: snapshot_path.to_string_lossy().into_owned(),
        sha256,
        size_bytes,
        collected_at: now,
        collector_name: collector_name.to_string(),
        collector_version: collector_version.to_string(),
        parser_version: "1".to_string(),
        acquisition_method: "sqlite_safe_copy".to_string(),
        payload_json: payload.to_string(),
        record_hash: String::new(),
    };
    let mut history_artifact = history_artifact;
    history_artifact.record_hash = history_artifact.compute_record_hash();

    let zip_path = store
        .device_dir(case_id, device_id)
        .join(format!("{}_{}_{}.zip", ArtifactType::BrowserHistoryDb.as_str(), crate::evidence_store::sanitize_filename(profile_label), now));
    zip_sqlite_snapshot(&copied, &zip_path)?;
    let (zip_sha256, zip_size) = crate::hasher::hash_file(&zip_path)?;

    let db_payload = serde_json::json!({"browser": format!("{:?}", kind).to_lowercase(), "profile": profile_label});
    let mut db_artifact = Artifact {
        artifact_id: new_id(prefix::ARTIFACT),
        case_id: case_id.to_string(),
        device_id: device_id.to_string(),
        artifact_type: ArtifactType::BrowserHistoryDb,
        source_ref: profile_label.to_string(),
        snapshot_path: zip_path.to_string_lossy().into_owned(),
        sha256: zip_sha256,
        size_bytes: zip_size,
        collected_at: now,
        collector_name: collector_name.to_string(),
        collector_version: collector_version.to_string(),
        parser_version: "1".to_string(),
        acquisition_method: "sqlite_safe_copy_zip".to_string(),
        payload_json: db_payload.to_string(),
        record_hash: String::new(),
    };
    db_artifact.record_hash = db_artifact.compute_record_hash();

    Ok(vec![history_artifact, db_artifact])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_domain_strips_www_and_lowercases() {
        assert_eq!(normalize_domain("https://WWW.Binance.com/trade").as_deref(), Some("binance.com"));
        assert_eq!(normalize_domain("not a url").as_deref(), None);
    }
}
