//! Chat sessions: one conversation's agent context plus its visible history

use super::chat::{ChatAgent, ToolCallLog, DEFAULT_SYSTEM_PROMPT};
use super::reasoning::clean_reply;
use crate::config::Config;
use crate::llm::{LlmError, LlmProvider, TokenUsage};
use crate::mcp::{wrap_agent_tools, McpClient, RemoteInteractionLog};
use crate::storage::InteractionSink;
use crate::tools::ToolRegistry;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Prefix of replies produced from a failed turn
pub const ERROR_PREFIX: &str = "⚠️ [ERROR]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry in the visible chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Why a turn produced no agent reply
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("turn timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("{0:#}")]
    Agent(anyhow::Error),
}

impl TurnError {
    /// Classify an agent failure, keeping model errors typed
    pub fn from_agent(err: anyhow::Error) -> Self {
        match err.downcast::<LlmError>() {
            Ok(llm) => TurnError::Model(llm),
            Err(other) => TurnError::Agent(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TurnError::Timeout(_) => "timeout",
            TurnError::Model(_) => "model",
            TurnError::Agent(_) => "agent",
        }
    }

    /// Text shown in place of the reply
    pub fn user_message(&self) -> String {
        let detail = match self {
            TurnError::Timeout(secs) => format!(
                "No answer within {} seconds. Try a simpler question.",
                secs
            ),
            TurnError::Model(e) => e.user_message(),
            TurnError::Agent(e) => format!("{:#}", e),
        };
        format!("{} {}", ERROR_PREFIX, detail)
    }
}

/// Everything a front-end needs to show after one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub elapsed_secs: f64,
    pub tool_calls: Vec<ToolCallLog>,
    /// Tokens the model reported for this turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Error kind when the turn failed (`timeout`, `model`, `agent`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One conversation
pub struct ChatSession {
    id: String,
    agent: ChatAgent,
    history: Vec<ChatMessage>,
    sink: Arc<dyn InteractionSink>,
    turn_timeout_secs: u64,
}

impl ChatSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Forget both the visible history and the agent's context
    pub fn clear(&mut self) {
        self.history.clear();
        self.agent.reset();
    }

    /// Run one user message through the agent
    ///
    /// Never fails: errors become the reply text. The interaction is logged
    /// through the sink; a logging failure is only traced. A failed turn
    /// leaves the agent's context as it was before the message.
    pub async fn handle_turn(&mut self, message: &str) -> TurnOutcome {
        let start = Instant::now();
        tracing::info!(session = %self.id, "User: {}", message);
        self.history.push(ChatMessage::user(message));

        let checkpoint = self.agent.checkpoint();
        let result = tokio::time::timeout(
            Duration::from_secs(self.turn_timeout_secs),
            self.agent.chat(message),
        )
        .await;

        let (raw, tool_calls, usage, error) = match result {
            Ok(Ok(response)) => (response.text, response.tool_call_log, response.usage, None),
            Ok(Err(e)) => {
                let err = TurnError::from_agent(e);
                tracing::error!(session = %self.id, kind = err.kind(), "Turn failed: {}", err);
                (err.user_message(), Vec::new(), None, Some(err.kind().to_string()))
            }
            Err(_) => {
                // The agent was dropped mid-step
                self.agent.rollback(checkpoint);
                let err = TurnError::Timeout(self.turn_timeout_secs);
                tracing::error!(session = %self.id, "Turn failed: {}", err);
                (err.user_message(), Vec::new(), None, Some(err.kind().to_string()))
            }
        };
        tracing::debug!(session = %self.id, "Raw reply: {:?}", raw);

        let reply = clean_reply(&raw);
        self.history.push(ChatMessage::assistant(&reply));

        let elapsed_secs = start.elapsed().as_secs_f64();
        match self.sink.record(message, &reply, elapsed_secs).await {
            Ok(id) => tracing::info!(
                session = %self.id,
                "Logged interaction {} in {:.3} sec",
                id,
                elapsed_secs
            ),
            Err(e) => tracing::warn!(session = %self.id, "Failed to log interaction: {:#}", e),
        }

        TurnOutcome {
            reply,
            elapsed_secs,
            tool_calls,
            usage,
            error,
        }
    }
}

/// Builds sessions that share a model, a tool set and an interaction sink
pub struct SessionFactory {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn InteractionSink>,
    system_prompt: String,
    max_iterations: usize,
    turn_timeout_secs: u64,
    /// Set when built by `connect`; ended by `close`
    client: Option<Arc<McpClient>>,
}

impl SessionFactory {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        sink: Arc<dyn InteractionSink>,
    ) -> Self {
        Self {
            llm,
            tools,
            sink,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: 10,
            turn_timeout_secs: 300,
            client: None,
        }
    }

    /// Connect to the tool server and discover its tools
    ///
    /// Fails if the server cannot be reached; there is no retry.
    pub async fn connect(config: &Config, llm: Arc<dyn LlmProvider>) -> Result<Self> {
        tracing::info!("Fetching tools from {}", config.chat.server_url);
        let client = Arc::new(McpClient::connect(&config.chat.server_url).await?);

        let mut registry = ToolRegistry::new();
        registry.set_tool_timeout_secs(config.chat.tool_timeout_secs.saturating_add(5));
        for tool in wrap_agent_tools(client.clone(), config.chat.tool_timeout_secs) {
            registry.register(tool);
        }
        tracing::info!(
            "Loaded {} tools from '{}': {}",
            registry.len(),
            client.server_name(),
            registry.names().join(", ")
        );

        let sink: Arc<dyn InteractionSink> = Arc::new(RemoteInteractionLog::new(
            client.clone(),
            config.chat.tool_timeout_secs,
        ));

        let mut factory = Self::new(llm, Arc::new(registry), sink).with_config(config);
        factory.client = Some(client);
        Ok(factory)
    }

    /// End the tool server session opened by `connect`
    ///
    /// Sessions built afterwards can no longer call tools.
    pub async fn close(&self) {
        let Some(client) = &self.client else {
            return;
        };
        match client.close().await {
            Ok(()) => tracing::debug!("Closed MCP session with '{}'", client.server_name()),
            Err(e) => tracing::warn!("Failed to close MCP session: {:#}", e),
        }
    }

    /// Apply agent and timeout settings
    pub fn with_config(mut self, config: &Config) -> Self {
        if let Some(prompt) = &config.agent.system_prompt {
            self.system_prompt = prompt.clone();
        }
        self.max_iterations = config.agent.max_iterations;
        self.turn_timeout_secs = config.chat.turn_timeout_secs;
        self
    }

    pub fn sink(&self) -> Arc<dyn InteractionSink> {
        self.sink.clone()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn create(&self, id: impl Into<String>) -> ChatSession {
        let agent =
            ChatAgent::with_system_prompt(self.llm.clone(), self.tools.clone(), &self.system_prompt)
                .with_max_iterations(self.max_iterations);

        ChatSession {
            id: id.into(),
            agent,
            history: Vec::new(),
            sink: self.sink.clone(),
            turn_timeout_secs: self.turn_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, Message, ToolDefinition};
    use crate::storage::Interaction;
    use async_trait::async_trait;
    use std::sync::Mutex;

    enum FixedLlm {
        Reply(String),
        Unreachable,
    }

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<LlmResponse> {
            match self {
                FixedLlm::Reply(text) => Ok(LlmResponse::Text {
                    text: text.clone(),
                    usage: None,
                }),
                FixedLlm::Unreachable => {
                    Err(LlmError::Unreachable("connection refused".into()).into())
                }
            }
        }
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmProvider for SlowLlm {
        fn name(&self) -> &str {
            "slow"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<LlmResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(LlmResponse::Text {
                text: "late".into(),
                usage: None,
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<(String, String, f64)>>,
        fail: bool,
    }

    #[async_trait]
    impl InteractionSink for MemorySink {
        async fn record(&self, prompt: &str, response: &str, elapsed_secs: f64) -> Result<i64> {
            if self.fail {
                anyhow::bail!("log unavailable");
            }
            let mut rows = self.rows.lock().unwrap();
            rows.push((prompt.into(), response.into(), elapsed_secs));
            Ok(rows.len() as i64)
        }

        async fn recent(&self, _limit: usize) -> Vec<Interaction> {
            Vec::new()
        }
    }

    fn session(llm: Arc<dyn LlmProvider>, sink: Arc<MemorySink>) -> ChatSession {
        SessionFactory::new(llm, Arc::new(ToolRegistry::new()), sink).create("s1")
    }

    #[tokio::test]
    async fn successful_turn_is_cleaned_and_logged() {
        let sink = Arc::new(MemorySink::default());
        let llm = Arc::new(FixedLlm::Reply("<think>hmm</think>\nHello!".into()));
        let mut session = session(llm, sink.clone());

        let outcome = session.handle_turn("hi").await;
        assert_eq!(outcome.reply, "Hello!");
        assert!(outcome.error.is_none());
        assert!(outcome.elapsed_secs >= 0.0);
        assert_eq!(
            session.history(),
            &[ChatMessage::user("hi"), ChatMessage::assistant("Hello!")]
        );

        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "Hello!");
        assert!(rows[0].2 >= 0.0);
    }

    #[tokio::test]
    async fn model_error_becomes_reply_and_is_logged() {
        let sink = Arc::new(MemorySink::default());
        let llm = Arc::new(FixedLlm::Unreachable);
        let mut session = session(llm, sink.clone());

        let outcome = session.handle_turn("hi").await;
        assert!(outcome.reply.starts_with(ERROR_PREFIX));
        assert!(outcome.reply.contains("Ollama"));
        assert_eq!(outcome.error.as_deref(), Some("model"));

        let rows = sink.rows.lock().unwrap();
        assert!(rows[0].2 >= 0.0);
    }

    #[tokio::test]
    async fn empty_reply_gets_placeholder() {
        let sink = Arc::new(MemorySink::default());
        let llm = Arc::new(FixedLlm::Reply("<think>nothing to say</think>".into()));
        let mut session = session(llm, sink);
        let outcome = session.handle_turn("hi").await;
        assert_eq!(outcome.reply, super::super::reasoning::NO_RESPONSE);
    }

    #[tokio::test]
    async fn logging_failure_does_not_fail_turn() {
        let sink = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let llm = Arc::new(FixedLlm::Reply("fine".into()));
        let mut session = session(llm, sink);
        let outcome = session.handle_turn("hi").await;
        assert_eq!(outcome.reply, "fine");
    }

    #[tokio::test]
    async fn turn_timeout_is_reported() {
        let sink = Arc::new(MemorySink::default());
        let mut config = Config::default();
        config.chat.turn_timeout_secs = 1;
        let mut session = SessionFactory::new(Arc::new(SlowLlm), Arc::new(ToolRegistry::new()), sink)
            .with_config(&config)
            .create("slow");

        let outcome = session.handle_turn("hi").await;
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
        assert!(outcome.reply.starts_with(ERROR_PREFIX));
    }

    /// Requests a tool on the first step, then never answers
    struct ToolThenStallLlm {
        steps: Mutex<usize>,
    }

    #[async_trait]
    impl LlmProvider for ToolThenStallLlm {
        fn name(&self) -> &str {
            "stall"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<LlmResponse> {
            let first = {
                let mut steps = self.steps.lock().unwrap();
                *steps += 1;
                *steps == 1
            };
            if first {
                return Ok(LlmResponse::ToolCalls {
                    calls: vec![crate::llm::ToolCall {
                        id: "c1".into(),
                        name: "add_data".into(),
                        arguments: serde_json::json!({"query": "SELECT 1"}),
                    }],
                    usage: None,
                });
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(LlmResponse::Text {
                text: "late".into(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn timed_out_turn_leaves_no_partial_context() {
        let sink = Arc::new(MemorySink::default());
        let mut config = Config::default();
        config.chat.turn_timeout_secs = 1;
        let llm = Arc::new(ToolThenStallLlm {
            steps: Mutex::new(0),
        });
        let mut session = SessionFactory::new(llm, Arc::new(ToolRegistry::new()), sink)
            .with_config(&config)
            .create("stall");

        let outcome = session.handle_turn("add someone").await;
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
        assert_eq!(session.agent.context().turn_messages(), 0);
        assert!(session
            .agent
            .context()
            .messages()
            .iter()
            .all(|m| m.tool_calls.is_empty()));
        // The visible history still shows the exchange
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn clear_resets_history() {
        let sink = Arc::new(MemorySink::default());
        let llm = Arc::new(FixedLlm::Reply("ok".into()));
        let mut session = session(llm, sink);
        session.handle_turn("hi").await;
        session.clear();
        assert!(session.history().is_empty());
    }
}
