//! MCP client for the tool server (async).
//!
//! Discovery happens exactly once, in [`McpClient::connect`]; the tool list
//! is never refreshed afterwards.

use super::transport::HttpTransport;
use super::types::{McpToolDef, McpToolResult, PROTOCOL_VERSION};
use anyhow::{Context, Result};
use serde_json::{json, Value};

/// A live session with one MCP server
pub struct McpClient {
    transport: HttpTransport,
    /// Discovered tools
    tools: Vec<McpToolDef>,
    server_name: String,
}

impl McpClient {
    /// Initialize a session and discover tools
    ///
    /// Any failure here is returned as-is; there is no retry.
    pub async fn connect(server_url: &str) -> Result<Self> {
        let transport = HttpTransport::new(server_url)?;

        let init = transport
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "sqlmcp",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await
            .with_context(|| format!("Failed to initialize MCP session with {}", server_url))?;

        transport
            .notify("notifications/initialized", None)
            .await
            .context("Failed to send initialized notification")?;

        let server_name = init
            .pointer("/serverInfo/name")
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();

        let listed = transport
            .request("tools/list", None)
            .await
            .context("Failed to list MCP tools")?;
        let tools: Vec<McpToolDef> = listed
            .get("tools")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .context("Failed to parse MCP tool list")?
            .unwrap_or_default();

        tracing::info!(
            "Connected to MCP server '{}' at {} ({} tools)",
            server_name,
            server_url,
            tools.len()
        );

        Ok(Self {
            transport,
            tools,
            server_name,
        })
    }

    /// Tools discovered at connect time
    pub fn tools(&self) -> &[McpToolDef] {
        &self.tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Call a tool on the server
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<McpToolResult> {
        let result = self
            .transport
            .request(
                "tools/call",
                Some(json!({
                    "name": tool_name,
                    "arguments": arguments
                })),
            )
            .await
            .with_context(|| format!("Failed to call tool: {}", tool_name))?;

        serde_json::from_value(result).context("Failed to parse tool result")
    }

    /// Terminate the session on the server
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
