//! MCP (Model Context Protocol) over streamable HTTP.
//!
//! Both ends live here: the tool server (`server`) exposing the record store,
//! and the client (`client`, `transport`, `wrapper`) the chat agent uses to
//! reach it.

pub mod client;
pub mod jsonrpc;
pub mod remote_log;
pub mod server;
pub mod transport;
pub mod types;
pub mod wrapper;

// Re-export main types
pub use client::McpClient;
pub use remote_log::RemoteInteractionLog;
pub use server::{run_tool_server, McpServerState};
pub use transport::HttpTransport;
pub use types::{McpContent, McpToolDef, McpToolResult};
pub use wrapper::{wrap_agent_tools, McpToolWrapper};
