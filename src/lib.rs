//! sqlmcp: a SQLite tool server spoken to over MCP, and a chat front-end
//! that lets a local Ollama model read and write it.
//!
//! This library provides:
//! - MCP tool server over streamable HTTP exposing the record store
//! - MCP client that discovers the server's tools and wraps them for the agent
//! - Chat agent with a tool-calling loop and per-session conversations
//! - Interaction log of every completed turn
//! - HTTP chat UI and terminal commands

pub mod agent;
pub mod config;
pub mod llm;
pub mod mcp;
pub mod storage;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use storage::{InteractionLog, RecordStore};
