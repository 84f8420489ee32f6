//! Merge audit trail.

use chrono::{DateTime, Utc};
use contentbank_model::{AuditSink, MergeAuditEvent, Result};
use rusqlite::{Connection, params};

/// Writes merge events to `merge_audit_log` as JSON payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteAuditLog;

impl SqliteAuditLog {
    /// Most recent events first.
    pub fn recent(&self, conn: &Connection, limit: usize) -> Result<Vec<MergeAuditEvent>> {
        let mut stmt =
            conn.prepare("SELECT payload FROM merge_audit_log ORDER BY id DESC LIMIT ?1")?;
        let payloads = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut events = Vec::with_capacity(payloads.len());
        for payload in payloads {
            events.push(serde_json::from_str(&payload)?);
        }
        Ok(events)
    }

    pub fn count(&self, conn: &Connection) -> Result<usize> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM merge_audit_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl AuditSink for SqliteAuditLog {
    fn record(&self, conn: &Connection, event: &MergeAuditEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let recorded_at = DateTime::<Utc>::from_timestamp_millis(event.recorded_at)
            .unwrap_or_else(Utc::now)
            .to_rfc3339();
        conn.execute(
            "INSERT INTO merge_audit_log (event_id, canonical_entry_id, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![event.event_id, event.canonical_entry_id, payload, recorded_at],
        )?;
        Ok(())
    }
}
