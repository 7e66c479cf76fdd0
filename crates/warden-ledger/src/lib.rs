//! SQLite-backed append-only warning ledger.
//!
//! The only durable state in Warden. Records are inserted by `issue` and read
//! back newest-first by `history`; no update or delete is exposed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("warning ledger io error")]
    Io(#[from] std::io::Error),
    #[error("warning ledger database error")]
    Database(#[from] rusqlite::Error),
    #[error("warning ledger stored an invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// One persisted disciplinary record. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub id: i64,
    pub user_id: String,
    pub user_name: String,
    pub admin_id: String,
    pub admin_name: String,
    pub reason: String,
    pub proof_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWarning {
    pub user_id: String,
    pub user_name: String,
    pub admin_id: String,
    pub admin_name: String,
    pub reason: String,
    pub proof_url: Option<String>,
}

#[derive(Debug)]
pub struct WarningStore {
    db_path: PathBuf,
}

impl WarningStore {
    /// Opens a store at `path`, creating the schema when missing.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> LedgerResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> LedgerResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS warnings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                user_name TEXT NOT NULL,
                admin_id TEXT NOT NULL,
                admin_name TEXT NOT NULL,
                reason TEXT NOT NULL,
                proof_url TEXT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_warnings_user ON warnings (user_id, created_at);
            "#,
        )?;
        Ok(())
    }

    /// Appends a record and returns it with the generated id and timestamp.
    pub fn issue(&self, warning: NewWarning) -> LedgerResult<WarningRecord> {
        let created_at = truncate_to_seconds(Utc::now());
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO warnings (
                user_id, user_name, admin_id, admin_name, reason, proof_url, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                warning.user_id,
                warning.user_name,
                warning.admin_id,
                warning.admin_name,
                warning.reason,
                warning.proof_url,
                timestamp_to_db(created_at),
            ],
        )?;
        let id = connection.last_insert_rowid();

        Ok(WarningRecord {
            id,
            user_id: warning.user_id,
            user_name: warning.user_name,
            admin_id: warning.admin_id,
            admin_name: warning.admin_name,
            reason: warning.reason,
            proof_url: warning.proof_url,
            created_at,
        })
    }

    /// All warnings for a user, newest first. Unknown users yield an empty
    /// list, not an error.
    pub fn history(&self, user_id: &str) -> LedgerResult<Vec<WarningRecord>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT id, user_id, user_name, admin_id, admin_name, reason, proof_url, created_at
            FROM warnings
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )?;
        let rows = statement.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, user_id, user_name, admin_id, admin_name, reason, proof_url, created_at) =
                row?;
            records.push(WarningRecord {
                id,
                user_id,
                user_name,
                admin_id,
                admin_name,
                reason,
                proof_url,
                created_at: timestamp_from_db(&created_at)?,
            });
        }
        Ok(records)
    }
}

fn truncate_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(value.timestamp(), 0).unwrap_or(value)
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn timestamp_from_db(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| LedgerError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, WarningStore) {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = WarningStore::open(tempdir.path().join("warden.db")).expect("store");
        (tempdir, store)
    }

    fn warning_for(user_id: &str, reason: &str, proof_url: Option<&str>) -> NewWarning {
        NewWarning {
            user_id: user_id.to_string(),
            user_name: "target".to_string(),
            admin_id: "A1".to_string(),
            admin_name: "admin".to_string(),
            reason: reason.to_string(),
            proof_url: proof_url.map(ToOwned::to_owned),
        }
    }

    #[test]
    fn issue_then_history_returns_the_persisted_record() {
        let (_tempdir, store) = test_store();
        let before = truncate_to_seconds(Utc::now());
        let issued = store
            .issue(warning_for("U1", "spam", None))
            .expect("issue");
        assert!(issued.id > 0);
        assert!(issued.proof_url.is_none());
        assert!(issued.created_at >= before);

        let history = store.history("U1").expect("history");
        assert_eq!(history, vec![issued]);
    }

    #[test]
    fn history_for_unknown_user_is_empty_not_an_error() {
        let (_tempdir, store) = test_store();
        let history = store.history("nobody").expect("history");
        assert!(history.is_empty());
    }

    #[test]
    fn history_orders_newest_first() {
        let (_tempdir, store) = test_store();
        let first = store
            .issue(warning_for("U2", "first", None))
            .expect("issue");
        let second = store
            .issue(warning_for("U2", "second", Some("https://proof.example/1")))
            .expect("issue");

        let history = store.history("U2").expect("history");
        assert_eq!(history.len(), 2);
        // Same-second inserts fall back to id ordering.
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[0].proof_url.as_deref(), Some("https://proof.example/1"));
        assert_eq!(history[1].id, first.id);
    }

    #[test]
    fn records_are_scoped_per_user() {
        let (_tempdir, store) = test_store();
        store.issue(warning_for("U3", "spam", None)).expect("issue");
        store.issue(warning_for("U4", "other", None)).expect("issue");
        assert_eq!(store.history("U3").expect("history").len(), 1);
        assert_eq!(store.history("U4").expect("history").len(), 1);
    }

    #[test]
    fn reopening_the_store_preserves_records() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("warden.db");
        {
            let store = WarningStore::open(&path).expect("store");
            store.issue(warning_for("U5", "kept", None)).expect("issue");
        }
        let reopened = WarningStore::open(&path).expect("store");
        assert_eq!(reopened.history("U5").expect("history").len(), 1);
    }
}
