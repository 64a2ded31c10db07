use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::types::{Alert, AlertKind, NewAlert};
use crate::error::{FraudGuardError, Result};

/// Append-only SQLite log of alerts, newest first.
/// All operations are synchronous (rusqlite is blocking).
/// Callers in async contexts should use `tokio::task::spawn_blocking`.
pub struct AlertStore {
    conn: Mutex<Connection>,
}

impl AlertStore {
    /// Create or open the alert database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FraudGuardError::Storage(format!("Failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(db_path).map_err(|e| {
            FraudGuardError::Storage(format!("Failed to open alert db at {:?}: {}", db_path, e))
        })?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS alerts (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_kind ON alerts(kind, seq DESC);",
        )
        .map_err(|e| FraudGuardError::Storage(format!("Failed to create alerts table: {}", e)))?;

        info!("Opened alert database at {:?}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FraudGuardError::Storage("Alert database lock poisoned".to_string()))
    }

    /// Record an alert at the head of the log and return it as stored.
    pub fn append(&self, alert: NewAlert) -> Result<Alert> {
        let created_at = alert.created_at.unwrap_or_else(Utc::now);
        let id = Ulid::from_datetime(SystemTime::from(created_at)).to_string();
        let payload_json = serde_json::to_string(&alert.payload)
            .map_err(|e| FraudGuardError::Storage(format!("Failed to serialize alert payload: {}", e)))?;

        self.conn()?.execute(
            "INSERT INTO alerts (id, kind, title, summary, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                alert.kind.as_str(),
                alert.title,
                alert.summary,
                payload_json,
                created_at.to_rfc3339()
            ],
        )?;

        info!("Recorded {} alert {}: {}", alert.kind, id, alert.title);
        Ok(Alert {
            id,
            kind: alert.kind,
            title: alert.title,
            summary: alert.summary,
            payload: alert.payload,
            created_at,
        })
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Most recent alerts first, at most `limit` of them.
    pub fn list(&self, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, title, summary, payload_json, created_at
             FROM alerts ORDER BY seq DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![clamp_limit(limit)], row_to_alert)?;
        collect_alerts(rows)
    }

    pub fn list_by_kind(&self, kind: AlertKind, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, title, summary, payload_json, created_at
             FROM alerts WHERE kind = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![kind.as_str(), clamp_limit(limit)], row_to_alert)?;
        collect_alerts(rows)
    }

    pub fn get(&self, id: &str) -> Result<Option<Alert>> {
        let raw = self
            .conn()?
            .query_row(
                "SELECT id, kind, title, summary, payload_json, created_at
                 FROM alerts WHERE id = ?1",
                params![id],
                row_to_alert,
            )
            .optional()?;
        raw.map(RawAlert::into_alert).transpose()
    }

    /// Delete an alert. Removing an unknown id is not an error.
    pub fn remove(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM alerts WHERE id = ?1", params![id])?;
        if deleted == 0 {
            debug!("No alert {} to remove", id);
        } else {
            info!("Removed alert {}", id);
        }
        Ok(())
    }
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Row as read from SQLite, before the text columns are parsed.
struct RawAlert {
    id: String,
    kind: String,
    title: String,
    summary: String,
    payload_json: String,
    created_at: String,
}

fn row_to_alert(row: &Row<'_>) -> rusqlite::Result<RawAlert> {
    Ok(RawAlert {
        id: row.get(0)?,
        kind: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        payload_json: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl RawAlert {
    fn into_alert(self) -> Result<Alert> {
        let kind: AlertKind = self.kind.parse().map_err(|e| {
            warn!("Alert {} has unreadable kind: {}", self.id, e);
            FraudGuardError::Storage(format!("Alert {} is corrupt: {}", self.id, e))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| FraudGuardError::Storage(format!("Alert {} has bad timestamp: {}", self.id, e)))?;
        let payload = serde_json::from_str(&self.payload_json)
            .map_err(|e| FraudGuardError::Storage(format!("Alert {} has bad payload: {}", self.id, e)))?;
        Ok(Alert {
            id: self.id,
            kind,
            title: self.title,
            summary: self.summary,
            payload,
            created_at,
        })
    }
}

fn collect_alerts(
    rows: impl Iterator<Item = rusqlite::Result<RawAlert>>,
) -> Result<Vec<Alert>> {
    rows.map(|row| row.map_err(FraudGuardError::from).and_then(RawAlert::into_alert))
        .collect()
}
