//! ThreatMatch persistence
//!
//! One row per abusive domain per report day. The ingester is the sole
//! writer; the per-day replace (delete then insert) runs inside a single
//! SQLite transaction so a crash can never leave a day half-written.

use anyhow::Context;
use chrono::NaiveDate;
use directories::ProjectDirs;
use rusqlite::{params, Connection};
use std::path::PathBuf;

use crate::client::metrica::DATE_FORMAT;
use crate::error::{MosmonError, Result};

/// One persisted threat match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatMatch {
    pub tld: String,
    pub check_date: NaiveDate,
    pub domain_name: String,
    pub threat_type: String,
}

/// Storage backend for threat matches
pub struct ThreatMatchStore {
    db_path: PathBuf,
}

impl ThreatMatchStore {
    /// Create a new store instance
    ///
    /// Initializes the database file in the user's data directory.
    pub fn new() -> Result<Self> {
        // Allow override of the DB path via environment variable. This makes
        // it easy to point the binary at a test DB or alternate file without
        // changing the user's application data dir.
        if let Ok(override_path) = std::env::var("MOSMON_THREAT_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "xbcsmith", "mosmon")
            .ok_or_else(|| MosmonError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| MosmonError::Storage(e.to_string()))?;

        let db_path = data_dir.join("threats.db");
        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    /// Create a store that uses the specified database path.
    ///
    /// Primarily useful for tests where the default application data
    /// directory is not desirable.
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists so opening the DB file succeeds.
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| MosmonError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| MosmonError::Storage(e.to_string()).into())
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS threat_match (
                id INTEGER PRIMARY KEY,
                tld TEXT NOT NULL,
                check_date TEXT NOT NULL,
                domain_name TEXT NOT NULL,
                threat_type TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| MosmonError::Storage(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_threat_match_tld_date
             ON threat_match (tld, check_date)",
            [],
        )
        .context("Failed to create index")
        .map_err(|e| MosmonError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Returns the greatest `check_date` already ingested for a TLD.
    pub fn max_check_date(&self, tld: &str) -> Result<Option<NaiveDate>> {
        let conn = self.open()?;

        let max: Option<String> = conn
            .query_row(
                "SELECT MAX(check_date) FROM threat_match WHERE tld = ?",
                params![tld],
                |row| row.get(0),
            )
            .context("Failed to query max check date")
            .map_err(|e| MosmonError::Storage(e.to_string()))?;

        match max {
            Some(date) => {
                let parsed = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
                    MosmonError::Storage(format!("unparseable check_date {}: {}", date, e))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Replaces every row for `(tld, check_date)` with the given
    /// `(domain_name, threat_type)` pairs, atomically.
    ///
    /// Re-running with the same input yields the same rows, which is what
    /// makes per-day ingestion idempotent.
    pub fn replace_day(
        &self,
        tld: &str,
        check_date: NaiveDate,
        rows: &[(String, String)],
    ) -> Result<()> {
        let mut conn = self.open()?;
        let date = check_date.format(DATE_FORMAT).to_string();

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| MosmonError::Storage(e.to_string()))?;

        tx.execute(
            "DELETE FROM threat_match WHERE tld = ? AND check_date = ?",
            params![tld, date],
        )
        .context("Failed to delete existing rows")
        .map_err(|e| MosmonError::Storage(e.to_string()))?;

        for (domain_name, threat_type) in rows {
            tx.execute(
                "INSERT INTO threat_match (tld, check_date, domain_name, threat_type)
                 VALUES (?, ?, ?, ?)",
                params![tld, date, domain_name, threat_type],
            )
            .context("Failed to insert threat match")
            .map_err(|e| MosmonError::Storage(e.to_string()))?;
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| MosmonError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Returns the rows stored for `(tld, check_date)`, ordered by domain
    /// name.
    pub fn rows_for_day(&self, tld: &str, check_date: NaiveDate) -> Result<Vec<ThreatMatch>> {
        let conn = self.open()?;
        let date = check_date.format(DATE_FORMAT).to_string();

        let mut stmt = conn
            .prepare(
                "SELECT tld, check_date, domain_name, threat_type
                 FROM threat_match
                 WHERE tld = ? AND check_date = ?
                 ORDER BY domain_name, threat_type",
            )
            .context("Failed to prepare statement")
            .map_err(|e| MosmonError::Storage(e.to_string()))?;

        let rows_iter = stmt
            .query_map(params![tld, date], |row| {
                let tld: String = row.get(0)?;
                let date_str: String = row.get(1)?;
                let domain_name: String = row.get(2)?;
                let threat_type: String = row.get(3)?;
                Ok((tld, date_str, domain_name, threat_type))
            })
            .context("Failed to query threat matches")
            .map_err(|e| MosmonError::Storage(e.to_string()))?;

        let mut rows = Vec::new();
        for row in rows_iter.flatten() {
            let (tld, date_str, domain_name, threat_type) = row;
            let check_date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
                MosmonError::Storage(format!("unparseable check_date {}: {}", date_str, e))
            })?;
            rows.push(ThreatMatch {
                tld,
                check_date,
                domain_name,
                threat_type,
            });
        }

        Ok(rows)
    }
}
