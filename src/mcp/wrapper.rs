//! Wrapper that adapts remote MCP tools to the local Tool trait (async with timeout).

use super::client::McpClient;
use super::types::McpToolDef;
use crate::tools::{Tool, ToolResult, LOGGING_TOOLS};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for MCP tool calls (30 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Wraps an MCP tool to implement the Tool trait
pub struct McpToolWrapper {
    /// Tool definition from MCP server
    tool_def: McpToolDef,
    /// Client used for making calls
    client: Arc<McpClient>,
    /// Timeout for tool calls in seconds
    timeout_secs: u64,
}

impl McpToolWrapper {
    pub fn new(tool_def: McpToolDef, client: Arc<McpClient>) -> Self {
        Self {
            tool_def,
            client,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the timeout in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.tool_def.name
    }

    fn description(&self) -> &str {
        &self.tool_def.description
    }

    fn parameters(&self) -> Value {
        self.tool_def.input_schema.clone()
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        // Models sometimes send no arguments at all
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        tracing::info!(tool = %self.tool_def.name, args = %params, "Calling remote tool");

        match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.client.call_tool(&self.tool_def.name, params),
        )
        .await
        {
            Ok(Ok(result)) => {
                if result.is_error {
                    Ok(ToolResult::error(result.to_text()))
                } else {
                    Ok(ToolResult {
                        success: true,
                        output: result.to_text(),
                        data: Some(result.value_or_text()),
                    })
                }
            }
            Ok(Err(e)) => Ok(ToolResult::error(format!("MCP call failed: {:#}", e))),
            Err(_) => Ok(ToolResult::error(format!(
                "MCP call to '{}' timed out after {}s. \
                 The tool server may be unresponsive.",
                self.tool_def.name, self.timeout_secs
            ))),
        }
    }
}

/// Wrap every discovered tool the agent may use
///
/// The interaction log operations are left out.
pub fn wrap_agent_tools(client: Arc<McpClient>, timeout_secs: u64) -> Vec<Arc<dyn Tool>> {
    client
        .tools()
        .iter()
        .filter(|def| !LOGGING_TOOLS.contains(&def.name.as_str()))
        .map(|def| {
            Arc::new(McpToolWrapper::new(def.clone(), client.clone()).with_timeout(timeout_secs))
                as Arc<dyn Tool>
        })
        .collect()
}
