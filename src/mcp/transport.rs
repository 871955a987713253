//! MCP streamable HTTP transport (client side).
//!
//! Every message is a POST to the server's MCP endpoint. The server may
//! answer with a plain JSON body or with a `text/event-stream` body; the
//! session id handed out on `initialize` is echoed on every later request.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::types::SESSION_HEADER;
use anyhow::{bail, Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use url::Url;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// HTTP transport for a single MCP endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a transport for `endpoint` (e.g. `http://127.0.0.1:8000/mcp`)
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("Invalid MCP server URL: {}", endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("Unsupported MCP server URL scheme: {}", endpoint.scheme());
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            next_id: AtomicU64::new(1),
            session_id: RwLock::new(None),
        })
    }

    /// Session id assigned by the server, once initialized
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Send a request and wait for response
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let response = self.post(&request).await?;
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .context("Failed to read MCP response body")?;
        tracing::debug!("MCP response: {}", body.trim());

        let response = if is_sse {
            parse_sse_response(&body, &Value::from(id))?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)
                .context("Failed to parse MCP response")?
        };

        response.into_result()
    }

    /// Send a notification (no response expected)
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcRequest::notification(method, params);
        self.post(&notification).await?;
        Ok(())
    }

    /// End the server-side session, if one was assigned
    pub async fn close(&self) -> Result<()> {
        let Some(session) = self.session_id() else {
            return Ok(());
        };
        self.client
            .delete(self.endpoint.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await
            .context("Failed to close MCP session")?;
        Ok(())
    }

    async fn post(&self, message: &JsonRpcRequest) -> Result<reqwest::Response> {
        let kind = if message.is_notification() {
            "notification"
        } else {
            "request"
        };
        tracing::debug!("MCP {}: {}", kind, message.method);

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, ACCEPT_BOTH)
            .json(message);
        if let Some(session) = self.session_id() {
            builder = builder.header(SESSION_HEADER, session);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach MCP server at {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("MCP server returned HTTP {}: {}", status, body.trim());
        }

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut guard = self.session_id.write().unwrap_or_else(|e| e.into_inner());
            if guard.as_deref() != Some(session) {
                tracing::debug!("MCP session id: {}", session);
                *guard = Some(session.to_string());
            }
        }

        Ok(response)
    }
}

/// Pick the response matching `id` out of an SSE body
fn parse_sse_response(body: &str, id: &Value) -> Result<JsonRpcResponse> {
    for event in body.split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect();
        if data.is_empty() {
            continue;
        }

        let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&data.join("\n")) else {
            continue;
        };
        if &response.id == id {
            return Ok(response);
        }
    }
    bail!("No response for request {} in MCP event stream", id)
}
