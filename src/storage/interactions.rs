//! Interaction log: one row per completed chat turn

use super::{open_connection, StoreError, CREATE_INTERACTIONS};
use anyhow::Result;
use async_trait::async_trait;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prompt text of the record returned when the log cannot be read
pub const FETCH_ERROR_PROMPT: &str = "Error fetching interactions";

/// A logged chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub prompt: String,
    pub response: String,
    pub time_taken_sec: f64,
    #[serde(default)]
    pub timestamp: String,
}

impl Interaction {
    /// Stand-in row shown when the log could not be read
    pub fn fetch_error(error: impl std::fmt::Display) -> Self {
        Self {
            id: 0,
            prompt: FETCH_ERROR_PROMPT.to_string(),
            response: error.to_string(),
            time_taken_sec: 0.0,
            timestamp: String::new(),
        }
    }

    pub fn is_fetch_error(&self) -> bool {
        self.id == 0 && self.prompt == FETCH_ERROR_PROMPT
    }
}

/// Somewhere completed turns are written to and read back from
#[async_trait]
pub trait InteractionSink: Send + Sync {
    /// Append one interaction, returning its id
    async fn record(&self, prompt: &str, response: &str, elapsed_secs: f64) -> Result<i64>;

    /// Newest-first, at most `limit` rows; never fails, a read error
    /// yields a single [`Interaction::fetch_error`] row
    async fn recent(&self, limit: usize) -> Vec<Interaction>;
}

/// Round to milliseconds and reject values that cannot be a duration
pub fn normalize_elapsed(elapsed_secs: f64) -> Result<f64, StoreError> {
    if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
        return Err(StoreError::Invalid(format!(
            "time_taken_sec must be a non-negative number, got {}",
            elapsed_secs
        )));
    }
    Ok((elapsed_secs * 1000.0).round() / 1000.0)
}

/// Local interaction log over a SQLite file
///
/// Every call opens its own connection and closes it on return.
#[derive(Debug, Clone)]
pub struct InteractionLog {
    db_path: PathBuf,
}

impl InteractionLog {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Blocking insert
    pub fn insert(&self, prompt: &str, response: &str, elapsed_secs: f64) -> Result<i64, StoreError> {
        let elapsed = normalize_elapsed(elapsed_secs)?;
        let conn = open_connection(&self.db_path)?;
        conn.execute(CREATE_INTERACTIONS, [])?;
        conn.execute(
            "INSERT INTO interactions (prompt, response, time_taken_sec) VALUES (?1, ?2, ?3)",
            params![prompt, response, elapsed],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Blocking read, newest first
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<Interaction>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = open_connection(&self.db_path)?;
        conn.execute(CREATE_INTERACTIONS, [])?;
        let mut stmt = conn.prepare(
            "SELECT id, prompt, response, time_taken_sec, timestamp
             FROM interactions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(Interaction {
                id: row.get(0)?,
                prompt: row.get(1)?,
                response: row.get(2)?,
                time_taken_sec: row.get(3)?,
                timestamp: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Like [`fetch_recent`](Self::fetch_recent) but folds errors into the
    /// sentinel row
    pub fn recent_or_sentinel(&self, limit: usize) -> Vec<Interaction> {
        match self.fetch_recent(limit) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Failed to fetch interactions: {}", e);
                vec![Interaction::fetch_error(e)]
            }
        }
    }
}

#[async_trait]
impl InteractionSink for InteractionLog {
    async fn record(&self, prompt: &str, response: &str, elapsed_secs: f64) -> Result<i64> {
        let log = self.clone();
        let prompt = prompt.to_string();
        let response = response.to_string();
        let id = tokio::task::spawn_blocking(move || log.insert(&prompt, &response, elapsed_secs))
            .await??;
        Ok(id)
    }

    async fn recent(&self, limit: usize) -> Vec<Interaction> {
        let log = self.clone();
        match tokio::task::spawn_blocking(move || log.recent_or_sentinel(limit)).await {
            Ok(rows) => rows,
            Err(e) => vec![Interaction::fetch_error(e)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log() -> (TempDir, InteractionLog) {
        let tmp = TempDir::new().unwrap();
        let log = InteractionLog::new(tmp.path().join("demo.db"));
        (tmp, log)
    }

    #[test]
    fn test_normalize_elapsed() {
        assert_eq!(normalize_elapsed(1.23456).unwrap(), 1.235);
        assert_eq!(normalize_elapsed(0.0).unwrap(), 0.0);
        assert!(normalize_elapsed(-0.5).is_err());
        assert!(normalize_elapsed(f64::NAN).is_err());
        assert!(normalize_elapsed(f64::INFINITY).is_err());
    }

    #[test]
    fn test_insert_creates_table_on_demand() {
        let (_tmp, log) = log();
        let id = log.insert("hi", "hello", 0.42).unwrap();
        assert_eq!(id, 1);

        let rows = log.fetch_recent(5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prompt, "hi");
        assert_eq!(rows[0].time_taken_sec, 0.42);
        assert!(!rows[0].timestamp.is_empty());
    }

    #[test]
    fn test_recent_is_newest_first_and_bounded() {
        let (_tmp, log) = log();
        for i in 0..7 {
            log.insert(&format!("p{}", i), "r", 0.1).unwrap();
        }

        let rows = log.fetch_recent(3).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 6, 5]);
        assert!(rows.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn test_recent_zero_is_empty() {
        let (_tmp, log) = log();
        log.insert("a", "b", 0.1).unwrap();
        assert!(log.fetch_recent(0).unwrap().is_empty());
        assert!(log.recent_or_sentinel(0).is_empty());
    }

    #[test]
    fn test_negative_elapsed_is_rejected() {
        let (_tmp, log) = log();
        let err = log.insert("a", "b", -1.0).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_unreadable_store_yields_sentinel() {
        let tmp = TempDir::new().unwrap();
        // A directory cannot be opened as a database file
        let log = InteractionLog::new(tmp.path());
        let rows = log.recent_or_sentinel(5);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_fetch_error());
        assert_eq!(rows[0].time_taken_sec, 0.0);
        assert_eq!(rows[0].timestamp, "");
    }

    #[tokio::test]
    async fn test_sink_round_trip() {
        let (_tmp, log) = log();
        let sink: &dyn InteractionSink = &log;
        sink.record("q", "a", 2.0).await.unwrap();
        let rows = sink.recent(5).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].response, "a");
    }
}
