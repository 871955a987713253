//! Raw SQL passthrough
//!
//! Statements are executed exactly as given. Failures never escape as tool
//! errors: `add_data` answers `false` and `read_data` answers `[]`, with the
//! cause logged here on the server.

use super::{required_str, run_blocking, Tool, ToolResult};
use crate::storage::RecordStore;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ADD_DATA: &str = "add_data";
pub const READ_DATA: &str = "read_data";

const DEFAULT_READ_QUERY: &str = "SELECT * FROM people";

/// Execute a write statement (INSERT, UPDATE, DELETE, DDL)
pub struct AddDataTool {
    store: Arc<RecordStore>,
}

impl AddDataTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddDataTool {
    fn name(&self) -> &str {
        ADD_DATA
    }

    fn description(&self) -> &str {
        "Add data to the database using a SQL INSERT query. \
         The people table has columns id (auto), name (TEXT), age (INTEGER), profession (TEXT). \
         Example: INSERT INTO people (name, age, profession) VALUES ('Alice', 30, 'engineer'). \
         Returns true if the statement succeeded, false otherwise."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL write statement to execute"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let query = match required_str(&params, "query") {
            Ok(q) => q.to_string(),
            Err(result) => return Ok(result),
        };
        tracing::info!(tool = ADD_DATA, query = %query, "Executing write query");

        let store = self.store.clone();
        let stmt = query.clone();
        let ok = match run_blocking(move || store.execute_write(&stmt)).await? {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tool = ADD_DATA, query = %query, "Write query failed: {}", e);
                false
            }
        };

        Ok(ToolResult::value(json!(ok)))
    }
}

/// Execute a read query and return every row
pub struct ReadDataTool {
    store: Arc<RecordStore>,
}

impl ReadDataTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadDataTool {
    fn name(&self) -> &str {
        READ_DATA
    }

    fn description(&self) -> &str {
        "Read data from the database using a SQL SELECT query. \
         Defaults to SELECT * FROM people. \
         Returns a list of rows, each row a list of column values in query order."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL SELECT query to execute",
                    "default": DEFAULT_READ_QUERY
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(DEFAULT_READ_QUERY)
            .to_string();
        tracing::info!(tool = READ_DATA, query = %query, "Executing read query");

        let store = self.store.clone();
        let stmt = query.clone();
        let rows = match run_blocking(move || store.execute_read(&stmt)).await? {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(tool = READ_DATA, query = %query, "Read query failed: {}", e);
                Vec::new()
            }
        };

        Ok(ToolResult::value(json!(rows)))
    }
}
