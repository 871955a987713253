//! Parameterized people operations
//!
//! Values are always bound, never spliced into SQL text. Bad input comes
//! back as an error result the model can read and correct.

use super::{run_blocking, Tool, ToolResult};
use crate::storage::{NewPerson, PeopleFilter, RecordStore};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ADD_PERSON: &str = "add_person";
pub const QUERY_PEOPLE: &str = "query_people";

pub struct AddPersonTool {
    store: Arc<RecordStore>,
}

impl AddPersonTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddPersonTool {
    fn name(&self) -> &str {
        ADD_PERSON
    }

    fn description(&self) -> &str {
        "Add one person to the people table. Prefer this over add_data. \
         Returns the new row id."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Full name"},
                "age": {"type": "integer", "minimum": 0, "maximum": 150},
                "profession": {"type": "string"}
            },
            "required": ["name", "age", "profession"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let person: NewPerson = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(format!("Invalid arguments: {}", e))),
        };
        tracing::info!(
            tool = ADD_PERSON,
            name = %person.name,
            age = person.age,
            profession = %person.profession,
            "Adding person"
        );

        let store = self.store.clone();
        match run_blocking(move || store.insert_person(&person)).await? {
            Ok(id) => Ok(ToolResult::value(json!({ "id": id }))),
            Err(e) => {
                tracing::warn!(tool = ADD_PERSON, "Insert failed: {}", e);
                Ok(ToolResult::error(e.to_string()))
            }
        }
    }
}

pub struct QueryPeopleTool {
    store: Arc<RecordStore>,
}

impl QueryPeopleTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for QueryPeopleTool {
    fn name(&self) -> &str {
        QUERY_PEOPLE
    }

    fn description(&self) -> &str {
        "Look up people. All filters are optional: name_contains (substring, case-insensitive), \
         profession (exact, case-insensitive), min_age, max_age, limit (default 100). \
         Returns people ordered by id."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name_contains": {"type": "string"},
                "profession": {"type": "string"},
                "min_age": {"type": "integer"},
                "max_age": {"type": "integer"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 1000}
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let filter: PeopleFilter = if params.is_null() {
            PeopleFilter::default()
        } else {
            match serde_json::from_value(params) {
                Ok(f) => f,
                Err(e) => return Ok(ToolResult::error(format!("Invalid arguments: {}", e))),
            }
        };
        tracing::info!(tool = QUERY_PEOPLE, filter = ?filter, "Querying people");

        let store = self.store.clone();
        match run_blocking(move || store.query_people(&filter)).await? {
            Ok(people) => Ok(ToolResult::value(json!(people))),
            Err(e) => {
                tracing::warn!(tool = QUERY_PEOPLE, "Query failed: {}", e);
                Ok(ToolResult::error(e.to_string()))
            }
        }
    }
}
