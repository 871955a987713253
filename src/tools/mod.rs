//! Tools exposed by the tool server and consumed by the chat agent
//!
//! - `sql`: raw SQL passthrough (`add_data`, `read_data`)
//! - `people`: parameterized people operations (`add_person`, `query_people`)
//! - `interactions`: the shared interaction log (`record_interaction`, `recent_interactions`)
//!
//! The chat side fills a [`ToolRegistry`] with [`crate::mcp::McpToolWrapper`]s
//! instead, so the agent loop sees the same trait on both ends.

pub mod interactions;
pub mod people;
pub mod sql;

pub use interactions::{RecentInteractionsTool, RecordInteractionTool, LOGGING_TOOLS};
pub use people::{AddPersonTool, QueryPeopleTool};
pub use sql::{AddDataTool, ReadDataTool};

use crate::llm::ToolDefinition;
use crate::storage::{InteractionLog, RecordStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

/// Result of executing a tool
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    /// Text handed back to the model
    pub output: String,
    /// Structured value, when the tool produced one
    pub data: Option<Value>,
}

impl ToolResult {
    /// Successful result carrying a JSON value; the text is its JSON encoding
    pub fn value(data: Value) -> Self {
        Self {
            success: true,
            output: data.to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            data: None,
        }
    }
}

/// Trait for agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the JSON schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<ToolResult>;

    /// Convert to LLM tool definition
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Registry of available tools, kept in registration order
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
    tool_timeout_secs: u64,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }

    /// Create the tool server's registry over a record store and interaction log
    ///
    /// `add_data` and `read_data` are only registered when `raw_sql` is set.
    pub fn for_store(store: Arc<RecordStore>, log: InteractionLog, raw_sql: bool) -> Self {
        let mut registry = Self::new();
        if raw_sql {
            registry.register(Arc::new(AddDataTool::new(store.clone())));
            registry.register(Arc::new(ReadDataTool::new(store.clone())));
        }
        registry.register(Arc::new(AddPersonTool::new(store.clone())));
        registry.register(Arc::new(QueryPeopleTool::new(store)));
        registry.register(Arc::new(RecordInteractionTool::new(log.clone())));
        registry.register(Arc::new(RecentInteractionsTool::new(log)));
        registry
    }

    /// Register a tool; a tool with the same name is replaced in place
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Set the default tool timeout (seconds)
    pub fn set_tool_timeout_secs(&mut self, secs: u64) {
        self.tool_timeout_secs = secs;
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Execute a tool by name with given parameters
    ///
    /// Never returns `Err` for a failing tool: unknown names, timeouts and
    /// panics all come back as error results.
    pub async fn execute(&self, name: &str, params: Value) -> Result<ToolResult> {
        let Some(tool) = self.tools.get(name) else {
            return Ok(ToolResult::error(format!("Unknown tool: {}", name)));
        };

        let timeout_secs = self.tool_timeout_secs;

        match timeout(
            Duration::from_secs(timeout_secs),
            AssertUnwindSafe(tool.execute(params)).catch_unwind(),
        )
        .await
        {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => {
                tracing::warn!("Tool '{}' failed: {:#}", name, e);
                Ok(ToolResult::error(format!("Tool '{}' failed: {}", name, e)))
            }
            Ok(Err(panic_info)) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                tracing::error!("Tool '{}' panicked: {}", name, panic_msg);
                Ok(ToolResult::error(format!(
                    "Tool '{}' crashed: {}",
                    name, panic_msg
                )))
            }
            Err(_) => Ok(ToolResult::error(format!(
                "Tool '{}' timed out after {} seconds",
                name, timeout_secs
            ))),
        }
    }

    /// Get all tool definitions for the LLM, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.to_definition())
            .collect()
    }
}

/// Run blocking store work off the async executor
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Blocking tool task failed")
}

/// Fetch a required string argument
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolResult::error(format!("Missing required parameter: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::time;

    struct SleepTool {
        name: &'static str,
        duration: Duration,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "sleep tool"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {}
            })
        }

        async fn execute(&self, _params: Value) -> Result<ToolResult> {
            time::sleep(self.duration).await;
            Ok(ToolResult::value(json!("done")))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "boom"
        }

        fn description(&self) -> &str {
            "panics"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _params: Value) -> Result<ToolResult> {
            panic!("kaboom")
        }
    }

    #[tokio::test]
    async fn tool_registry_enforces_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool {
            name: "sleep",
            duration: Duration::from_secs(5),
        }));
        registry.set_tool_timeout_secs(1);

        let result = registry.execute("sleep", json!({})).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn tool_registry_reports_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nope", json!({})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Unknown tool: nope");
    }

    #[tokio::test]
    async fn tool_registry_recovers_from_panic() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanicTool));

        let result = registry.execute("boom", json!({})).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("kaboom"));
    }

    #[test]
    fn store_registry_respects_raw_sql_switch() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("demo.db");
        let store = Arc::new(RecordStore::open(&db).unwrap());

        let full = ToolRegistry::for_store(store.clone(), InteractionLog::new(&db), true);
        assert_eq!(
            full.names(),
            vec![
                "add_data",
                "read_data",
                "add_person",
                "query_people",
                "record_interaction",
                "recent_interactions"
            ]
        );

        let safe = ToolRegistry::for_store(store, InteractionLog::new(&db), false);
        assert!(safe.get("add_data").is_none());
        assert!(safe.get("read_data").is_none());
        assert_eq!(safe.len(), 4);
    }

    #[test]
    fn value_result_text_is_json() {
        let result = ToolResult::value(json!([[1, "Alice"]]));
        assert!(result.success);
        assert_eq!(result.output, r#"[[1,"Alice"]]"#);
    }
}
