//! Persistent storage for the tool server
//!
//! A single SQLite file holds both tables:
//!
//! ```text
//! demo.db
//! ├── people         # records mutated through the tool server
//! └── interactions   # one row per completed chat turn
//! ```
//!
//! [`RecordStore`] keeps one connection for the tool operations;
//! [`InteractionLog`] opens a scoped connection per call.

pub mod interactions;
pub mod records;

pub use interactions::{Interaction, InteractionLog, InteractionSink};
pub use records::{NewPerson, PeopleFilter, Person, RecordStore, Row};

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How long a statement waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const CREATE_PEOPLE: &str = "CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    profession TEXT NOT NULL
)";

pub(crate) const CREATE_INTERACTIONS: &str = "CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    time_taken_sec REAL NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
)";

/// Errors raised by the record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller input rejected before touching the database
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// SQLite rejected or failed the statement
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A previous holder of the connection panicked
    #[error("Record store connection is poisoned")]
    Poisoned,
}

impl StoreError {
    /// True when the caller supplied bad input rather than the store failing
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, StoreError::Invalid(_))
    }
}

/// Open a connection with the shared busy timeout applied
pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}
