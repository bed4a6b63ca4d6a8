//! Audit log operations

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::{parse_datetime, Database};
use crate::error::Result;

/// An audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}

impl Database {
    /// Record an audit log entry
    pub fn log_audit(
        &self,
        user_id: i64,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_log (user_id, action, entity_type, entity_id, details) \
             VALUES (?, ?, ?, ?, ?)",
            params![user_id, action, entity_type, entity_id, details],
        )?;

        Ok(())
    }

    /// Recent audit entries for a user, newest first
    pub fn list_audit_entries(&self, user_id: i64, limit: u32) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, user_id, action, entity_type, entity_id, details \
             FROM audit_log WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )?;

        let entries = stmt
            .query_map(params![user_id, limit], |row| {
                let ts_str: String = row.get(1)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: parse_datetime(&ts_str),
                    user_id: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
