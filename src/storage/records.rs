//! People records and raw SQL passthrough
//!
//! All statements go through one connection behind a mutex, so concurrent
//! tool calls are serialized here rather than by accident in SQLite.

use super::{open_connection, StoreError, CREATE_INTERACTIONS, CREATE_PEOPLE};
use anyhow::{Context, Result};
use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{params, params_from_iter, Batch, Connection, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default row cap for `query_people`
const DEFAULT_QUERY_LIMIT: u32 = 100;
/// Hard row cap for `query_people`
const MAX_QUERY_LIMIT: u32 = 1000;
const MAX_AGE: i64 = 150;

/// One result row; values are in the query's column order
pub type Row = Vec<Value>;

/// A stored person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub profession: String,
}

/// A person to insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerson {
    pub name: String,
    pub age: i64,
    pub profession: String,
}

impl NewPerson {
    pub fn new(name: impl Into<String>, age: i64, profession: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            profession: profession.into(),
        }
    }

    /// Trim text fields and check ranges
    pub fn validated(&self) -> Result<Self, StoreError> {
        let name = self.name.trim();
        let profession = self.profession.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("name must not be empty".into()));
        }
        if profession.is_empty() {
            return Err(StoreError::Invalid("profession must not be empty".into()));
        }
        if !(0..=MAX_AGE).contains(&self.age) {
            return Err(StoreError::Invalid(format!(
                "age must be between 0 and {}, got {}",
                MAX_AGE, self.age
            )));
        }
        Ok(Self::new(name, self.age, profession))
    }
}

/// Filter for `query_people`; every criterion is bound as a parameter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeopleFilter {
    /// Case-insensitive substring of the name
    pub name_contains: Option<String>,
    /// Exact profession, case-insensitive
    pub profession: Option<String>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub limit: Option<u32>,
}

/// Compile exactly one statement
///
/// `Connection::prepare` silently ignores whatever follows the first
/// statement, so the text is walked as a batch and any second statement is
/// rejected. Trailing whitespace, comments and semicolons are fine.
fn prepare_single<'c>(conn: &'c Connection, sql: &str) -> Result<Statement<'c>, StoreError> {
    let mut batch = Batch::new(conn, sql);
    let Some(stmt) = batch.next()? else {
        return Err(StoreError::Invalid("no SQL statement given".into()));
    };
    if batch.next()?.is_some() {
        return Err(StoreError::Invalid(
            "only one SQL statement may be executed per call".into(),
        ));
    }
    Ok(stmt)
}

/// SQLite-backed store for the `people` table
pub struct RecordStore {
    db_path: PathBuf,
    db: Arc<Mutex<Connection>>,
}

impl RecordStore {
    /// Open (or create) the database and make sure both tables exist
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        let conn = open_connection(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        tracing::info!("Ensuring table 'people' exists");
        conn.execute(CREATE_PEOPLE, [])?;
        tracing::info!("Ensuring table 'interactions' exists");
        conn.execute(CREATE_INTERACTIONS, [])?;

        Ok(Self {
            db_path,
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run caller-supplied SQL as a write statement (autocommit)
    pub fn execute_write(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let mut stmt = prepare_single(&conn, sql)?;
        let mut rows = stmt.query([])?;
        // Step to completion; any rows a write statement produces are discarded
        while rows.next()?.is_some() {}
        Ok(())
    }

    /// Run caller-supplied SQL and collect every result row
    pub fn execute_read(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = prepare_single(&conn, sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for idx in 0..columns {
                values.push(value_to_json(row.get_ref(idx)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Insert a person with bound parameters, returning the assigned id
    pub fn insert_person(&self, person: &NewPerson) -> Result<i64, StoreError> {
        let person = person.validated()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO people (name, age, profession) VALUES (?1, ?2, ?3)",
            params![person.name, person.age, person.profession],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Select people matching the filter, ordered by id
    pub fn query_people(&self, filter: &PeopleFilter) -> Result<Vec<Person>, StoreError> {
        if let (Some(min), Some(max)) = (filter.min_age, filter.max_age) {
            if min > max {
                return Err(StoreError::Invalid(format!(
                    "min_age {} is greater than max_age {}",
                    min, max
                )));
            }
        }

        let mut sql = String::from("SELECT id, name, age, profession FROM people WHERE 1 = 1");
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(name) = filter.name_contains.as_deref().map(str::trim) {
            if !name.is_empty() {
                sql.push_str(" AND name LIKE ? ESCAPE '\\'");
                args.push(Box::new(format!("%{}%", escape_like(name))));
            }
        }
        if let Some(profession) = filter.profession.as_deref().map(str::trim) {
            if !profession.is_empty() {
                sql.push_str(" AND profession = ? COLLATE NOCASE");
                args.push(Box::new(profession.to_string()));
            }
        }
        if let Some(min) = filter.min_age {
            sql.push_str(" AND age >= ?");
            args.push(Box::new(min));
        }
        if let Some(max) = filter.max_age {
            sql.push_str(" AND age <= ?");
            args.push(Box::new(max));
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT);
        sql.push_str(" ORDER BY id ASC LIMIT ?");
        args.push(Box::new(limit));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(Person {
                id: row.get(0)?,
                name: row.get(1)?,
                age: row.get(2)?,
                profession: row.get(3)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, RecordStore) {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path().join("demo.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_open_creates_both_tables() {
        let (_tmp, store) = store();
        let tables = store
            .execute_read("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let names: Vec<_> = tables.iter().map(|r| r[0].clone()).collect();
        assert!(names.contains(&json!("people")));
        assert!(names.contains(&json!("interactions")));
    }

    #[test]
    fn test_open_creates_missing_parent_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("demo.db");
        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_raw_write_then_read() {
        let (_tmp, store) = store();
        store
            .execute_write(
                "INSERT INTO people (name, age, profession) VALUES ('Alice', 30, 'engineer')",
            )
            .unwrap();

        let rows = store.execute_read("SELECT * FROM people").unwrap();
        assert_eq!(rows, vec![vec![json!(1), json!("Alice"), json!(30), json!("engineer")]]);
    }

    #[test]
    fn test_read_preserves_query_column_order() {
        let (_tmp, store) = store();
        store.insert_person(&NewPerson::new("Bob", 41, "chef")).unwrap();

        let rows = store
            .execute_read("SELECT profession, age, name FROM people")
            .unwrap();
        assert_eq!(rows[0], vec![json!("chef"), json!(41), json!("Bob")]);
    }

    #[test]
    fn test_read_maps_null_real_and_blob() {
        let (_tmp, store) = store();
        let rows = store
            .execute_read("SELECT NULL, 1.5, x'0102'")
            .unwrap();
        assert_eq!(rows[0], vec![Value::Null, json!(1.5), json!([1, 2])]);
    }

    #[test]
    fn test_multiple_statements_are_rejected_whole() {
        let (_tmp, store) = store();
        let err = store
            .execute_write(
                "INSERT INTO people (name, age, profession) VALUES ('A', 1, 'x'); \
                 INSERT INTO people (name, age, profession) VALUES ('B', 2, 'y')",
            )
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert!(store.execute_read("SELECT name FROM people").unwrap().is_empty());

        assert!(store
            .execute_read("SELECT 1; DELETE FROM people")
            .unwrap_err()
            .is_invalid_input());
    }

    #[test]
    fn test_trailing_semicolon_and_comment_allowed() {
        let (_tmp, store) = store();
        store
            .execute_write(
                "INSERT INTO people (name, age, profession) VALUES ('A', 1, 'x'); -- done\n",
            )
            .unwrap();
        let rows = store.execute_read("SELECT name FROM people;  ").unwrap();
        assert_eq!(rows, vec![vec![json!("A")]]);
        assert!(store.execute_write("   ").unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_malformed_sql_is_an_error() {
        let (_tmp, store) = store();
        assert!(store.execute_write("INSERT INTO nowhere VALUES (").is_err());
        assert!(store.execute_read("SELEC * FROM people").is_err());
        assert!(store.execute_read("SELECT * FROM missing_table").is_err());
    }

    #[test]
    fn test_constraint_violation_is_an_error() {
        let (_tmp, store) = store();
        let err = store
            .execute_write("INSERT INTO people (name, age, profession) VALUES (NULL, 1, 'x')")
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_insert_person_binds_values_verbatim() {
        let (_tmp, store) = store();
        let name = "Robert'); DROP TABLE people;--";
        let id = store
            .insert_person(&NewPerson::new(name, 12, "student"))
            .unwrap();
        assert_eq!(id, 1);

        let people = store.query_people(&PeopleFilter::default()).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, name);
    }

    #[test]
    fn test_insert_person_validation() {
        let (_tmp, store) = store();
        let err = store
            .insert_person(&NewPerson::new("  ", 30, "engineer"))
            .unwrap_err();
        assert!(err.is_invalid_input());

        let err = store
            .insert_person(&NewPerson::new("Eve", -1, "engineer"))
            .unwrap_err();
        assert!(err.is_invalid_input());

        let err = store.insert_person(&NewPerson::new("Eve", 30, "")).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_insert_person_trims_fields() {
        let (_tmp, store) = store();
        store
            .insert_person(&NewPerson::new("  Carol ", 52, " nurse "))
            .unwrap();
        let people = store.query_people(&PeopleFilter::default()).unwrap();
        assert_eq!(people[0].name, "Carol");
        assert_eq!(people[0].profession, "nurse");
    }

    #[test]
    fn test_query_people_filters() {
        let (_tmp, store) = store();
        store.insert_person(&NewPerson::new("Alice", 30, "engineer")).unwrap();
        store.insert_person(&NewPerson::new("Alan", 45, "Engineer")).unwrap();
        store.insert_person(&NewPerson::new("Bea", 22, "artist")).unwrap();

        let engineers = store
            .query_people(&PeopleFilter {
                profession: Some("engineer".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(engineers.len(), 2);

        let al = store
            .query_people(&PeopleFilter {
                name_contains: Some("al".into()),
                min_age: Some(40),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(al.len(), 1);
        assert_eq!(al[0].name, "Alan");

        let limited = store
            .query_people(&PeopleFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].name, "Alice");
    }

    #[test]
    fn test_query_people_like_wildcards_are_literal() {
        let (_tmp, store) = store();
        store.insert_person(&NewPerson::new("Alice", 30, "engineer")).unwrap();
        let none = store
            .query_people(&PeopleFilter {
                name_contains: Some("%".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_query_people_rejects_inverted_age_range() {
        let (_tmp, store) = store();
        let err = store
            .query_people(&PeopleFilter {
                min_age: Some(50),
                max_age: Some(10),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.is_invalid_input());
    }
}
