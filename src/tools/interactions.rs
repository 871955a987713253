//! Interaction log operations
//!
//! Called by the chat front-end after each turn; never offered to the model.

use super::{required_str, run_blocking, Tool, ToolResult};
use crate::storage::InteractionLog;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const RECORD_INTERACTION: &str = "record_interaction";
pub const RECENT_INTERACTIONS: &str = "recent_interactions";

/// Tools that serve the interaction log rather than the model
pub const LOGGING_TOOLS: [&str; 2] = [RECORD_INTERACTION, RECENT_INTERACTIONS];

const DEFAULT_RECENT_LIMIT: u64 = 5;

pub struct RecordInteractionTool {
    log: InteractionLog,
}

impl RecordInteractionTool {
    pub fn new(log: InteractionLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for RecordInteractionTool {
    fn name(&self) -> &str {
        RECORD_INTERACTION
    }

    fn description(&self) -> &str {
        "Append one completed chat turn to the interaction log."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "response": {"type": "string"},
                "time_taken_sec": {"type": "number", "minimum": 0}
            },
            "required": ["prompt", "response", "time_taken_sec"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let prompt = match required_str(&params, "prompt") {
            Ok(p) => p.to_string(),
            Err(result) => return Ok(result),
        };
        let response = match required_str(&params, "response") {
            Ok(r) => r.to_string(),
            Err(result) => return Ok(result),
        };
        let Some(elapsed) = params.get("time_taken_sec").and_then(|v| v.as_f64()) else {
            return Ok(ToolResult::error(
                "Missing required parameter: time_taken_sec",
            ));
        };
        tracing::info!(
            tool = RECORD_INTERACTION,
            prompt_len = prompt.len(),
            response_len = response.len(),
            elapsed,
            "Recording interaction"
        );

        let log = self.log.clone();
        match run_blocking(move || log.insert(&prompt, &response, elapsed)).await? {
            Ok(id) => Ok(ToolResult::value(json!({ "id": id }))),
            Err(e) => {
                tracing::warn!(tool = RECORD_INTERACTION, "Failed to record interaction: {}", e);
                Ok(ToolResult::error(e.to_string()))
            }
        }
    }
}

pub struct RecentInteractionsTool {
    log: InteractionLog,
}

impl RecentInteractionsTool {
    pub fn new(log: InteractionLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for RecentInteractionsTool {
    fn name(&self) -> &str {
        RECENT_INTERACTIONS
    }

    fn description(&self) -> &str {
        "Most recent interactions, newest first."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 0, "default": DEFAULT_RECENT_LIMIT}
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let limit = params
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_RECENT_LIMIT);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        tracing::info!(tool = RECENT_INTERACTIONS, limit, "Fetching interactions");

        let log = self.log.clone();
        let rows = run_blocking(move || log.recent_or_sentinel(limit)).await?;
        Ok(ToolResult::value(json!(rows)))
    }
}
