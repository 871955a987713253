//! Ollama LLM provider implementation (local models)

use super::{LlmError, LlmProvider, LlmResponse, Message, Role, TokenUsage, ToolCall, ToolDefinition};
use crate::config::OllamaConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Generate a unique tool call ID for Ollama tool calls
fn generate_tool_call_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ollama_call_{}", id)
}

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

/// Model info returned from Ollama's /api/tags endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

impl OllamaProvider {
    /// Create a provider from config; every request is bounded by
    /// `request_timeout_secs`
    pub fn from_config(config: &OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// List available models from Ollama's /api/tags endpoint
    pub async fn list_models(&self) -> Result<Vec<OllamaModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("Failed to connect to Ollama - is it running? Try: ollama serve")?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Ollama API error ({})", status);
        }

        #[derive(Deserialize)]
        struct TagsResponse {
            models: Vec<OllamaModelInfo>,
        }

        let resp: TagsResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(resp.models)
    }

    fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let tool_calls = if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        msg.tool_calls
                            .iter()
                            .map(|tc| OllamaToolCall {
                                function: OllamaToolCallFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                OllamaMessage {
                    role: role.to_string(),
                    content: msg.content.clone(),
                    tool_calls,
                }
            })
            .collect()
    }

    /// Convert ToolDefinition to native Ollama tool format
    fn convert_tools(tools: &[ToolDefinition]) -> Vec<OllamaTool> {
        tools
            .iter()
            .map(|t| OllamaTool {
                type_field: "function".to_string(),
                function: OllamaFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    async fn send_request(&self, request: OllamaRequest) -> Result<OllamaResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text));
        }

        response
            .json::<OllamaResponse>()
            .await
            .map_err(LlmError::from_network_error)
    }

    /// Fallback for models that describe a tool call as JSON in plain text:
    /// `{"tool": "read_data", "args": {...}}`
    fn parse_tool_call(content: &str) -> Option<ToolCall> {
        let content = content.trim();

        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end < start {
            return None;
        }
        let json_str = &content[start..=end];

        #[derive(Deserialize)]
        struct ToolCallJson {
            tool: String,
            #[serde(default)]
            args: serde_json::Value,
        }

        let tc = serde_json::from_str::<ToolCallJson>(json_str).ok()?;
        Some(ToolCall {
            id: generate_tool_call_id(),
            name: tc.tool,
            arguments: tc.args,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse> {
        let ollama_tools = tools.filter(|t| !t.is_empty()).map(Self::convert_tools);
        let offered: Vec<&str> = tools
            .unwrap_or_default()
            .iter()
            .map(|t| t.name.as_str())
            .collect();

        let request = OllamaRequest {
            model: self.model.clone(),
            messages: Self::convert_messages(messages),
            stream: false,
            tools: ollama_tools,
        };

        tracing::debug!(
            "Ollama request: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            offered.len()
        );
        let response = self.send_request(request).await?;
        let usage = match (response.prompt_eval_count, response.eval_count) {
            (Some(input), Some(output)) => Some(TokenUsage::new(input, output)),
            _ => None,
        };

        // Native tool calling
        if let Some(tool_calls) = response.message.tool_calls {
            if !tool_calls.is_empty() {
                let calls = tool_calls
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: generate_tool_call_id(),
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    })
                    .collect();

                let text = Some(response.message.content).filter(|t| !t.trim().is_empty());
                return Ok(match text {
                    Some(text) => LlmResponse::Mixed {
                        text: Some(text),
                        tool_calls: calls,
                        usage,
                    },
                    None => LlmResponse::ToolCalls { calls, usage },
                });
            }
        }

        // Text fallback, only for tools that were actually offered
        let content = &response.message.content;
        if let Some(tool_call) = Self::parse_tool_call(content) {
            if offered.contains(&tool_call.name.as_str()) {
                return Ok(LlmResponse::ToolCalls {
                    calls: vec![tool_call],
                    usage,
                });
            }
        }

        Ok(LlmResponse::Text {
            text: response.message.content,
            usage,
        })
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

// Native tool calling types
#[derive(Debug, Clone, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    type_field: String,
    function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}
