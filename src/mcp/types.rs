//! MCP protocol types and data structures.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol revision this server speaks
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Revisions accepted from clients
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 2] = ["2025-03-26", "2024-11-05"];

/// Header carrying the session id on streamable HTTP
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Tool definition from MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDef {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: String,
    /// JSON Schema for input parameters
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// Result of a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    /// Content returned by the tool
    pub content: Vec<McpContent>,
    /// Machine-readable form, `{"result": <value>}`
    #[serde(
        default,
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
    /// Whether the call resulted in an error
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

/// Content item in MCP responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum McpContent {
    /// Text content
    #[serde(rename = "text")]
    Text { text: String },
    /// Image content (base64)
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Resource reference
    #[serde(rename = "resource")]
    Resource { resource: Value },
}

impl McpToolResult {
    /// Successful result wrapping a JSON value
    pub fn value(value: Value) -> Self {
        Self {
            content: vec![McpContent::Text {
                text: value.to_string(),
            }],
            structured_content: Some(json!({ "result": value })),
            is_error: false,
        }
    }

    /// Plain text result
    pub fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            structured_content: None,
            is_error,
        }
    }

    /// Convert to string representation
    pub fn to_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                McpContent::Text { text } => text.clone(),
                McpContent::Image { .. } => "[Image]".to_string(),
                McpContent::Resource { resource } => format!("[Resource: {}]", resource),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The structured value, falling back to parsing the text content
    pub fn value_or_text(&self) -> Value {
        if let Some(result) = self
            .structured_content
            .as_ref()
            .and_then(|s| s.get("result"))
        {
            return result.clone();
        }
        let text = self.to_text();
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    }
}
