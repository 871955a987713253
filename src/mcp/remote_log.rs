//! Interaction log reached through the tool server

use super::client::McpClient;
use crate::storage::interactions::normalize_elapsed;
use crate::storage::{Interaction, InteractionSink};
use crate::tools::interactions::{RECENT_INTERACTIONS, RECORD_INTERACTION};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// [`InteractionSink`] backed by `record_interaction` / `recent_interactions`
pub struct RemoteInteractionLog {
    client: Arc<McpClient>,
    timeout: Duration,
}

impl RemoteInteractionLog {
    pub fn new(client: Arc<McpClient>, timeout_secs: u64) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<Interaction>> {
        let result = tokio::time::timeout(
            self.timeout,
            self.client
                .call_tool(RECENT_INTERACTIONS, json!({ "limit": limit })),
        )
        .await
        .map_err(|_| anyhow!("Timed out fetching interactions"))??;

        if result.is_error {
            bail!("{}", result.to_text());
        }
        serde_json::from_value(result.value_or_text()).context("Malformed interaction list")
    }
}

#[async_trait]
impl InteractionSink for RemoteInteractionLog {
    async fn record(&self, prompt: &str, response: &str, elapsed_secs: f64) -> Result<i64> {
        let elapsed = normalize_elapsed(elapsed_secs)?;
        let result = tokio::time::timeout(
            self.timeout,
            self.client.call_tool(
                RECORD_INTERACTION,
                json!({
                    "prompt": prompt,
                    "response": response,
                    "time_taken_sec": elapsed
                }),
            ),
        )
        .await
        .map_err(|_| anyhow!("Timed out recording interaction"))??;

        if result.is_error {
            bail!("Tool server rejected interaction: {}", result.to_text());
        }
        result
            .value_or_text()
            .get("id")
            .and_then(|id| id.as_i64())
            .ok_or_else(|| anyhow!("record_interaction returned no id"))
    }

    async fn recent(&self, limit: usize) -> Vec<Interaction> {
        if limit == 0 {
            return Vec::new();
        }
        match self.fetch(limit).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Failed to fetch interactions: {:#}", e);
                vec![Interaction::fetch_error(e)]
            }
        }
    }
}
