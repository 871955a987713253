//! Chat agent with tool execution

use super::context::ConversationContext;
use crate::llm::{LlmProvider, LlmResponse, Message, TokenUsage, ToolCall};
use crate::tools::ToolRegistry;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Built-in system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant. Use the tools to read/write the people database.\n\
The people table has columns: id (auto-assigned), name, age, profession.\n\
Prefer add_person and query_people; use add_data and read_data only for SQL they cannot express.\n\
Answer briefly once you have the information you need.";

const MAX_CONSECUTIVE_DUPLICATES: usize = 2;
const MAX_TOOL_CALLS_PER_TURN: usize = 5;
const RESULT_PREVIEW_CHARS: usize = 200;
const SKIPPED_CALL_RESULT: &str = "Skipped: earlier calls kept returning the same result.";

/// A single tool call log entry
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallLog {
    pub tool: String,
    pub args: serde_json::Value,
    pub result_preview: String,
    pub success: bool,
}

/// Response from the agent
#[derive(Debug)]
pub struct AgentResponse {
    pub text: String,
    pub tool_calls_made: usize,
    pub tool_call_log: Vec<ToolCallLog>,
    /// Summed over every model call in the turn; `None` if the model reported none
    pub usage: Option<TokenUsage>,
}

/// Context as it was before a turn started
pub struct Checkpoint(Vec<Message>);

/// Chat agent that can use tools to accomplish tasks
pub struct ChatAgent {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    context: ConversationContext,
    max_iterations: usize,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::with_system_prompt(llm, tools, DEFAULT_SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        system_prompt: &str,
    ) -> Self {
        let mut context = ConversationContext::new();
        context.add_system(system_prompt);

        Self {
            llm,
            tools,
            context,
            max_iterations: 10,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Forget the conversation (keeps system prompt)
    pub fn reset(&mut self) {
        self.context.clear_history();
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.context.snapshot())
    }

    /// Return the context to `checkpoint`, dropping a partial turn
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.context.restore(checkpoint.0);
    }

    /// Run one user turn to completion
    ///
    /// Tool failures are fed back to the model; only model/transport errors
    /// return `Err`, and then the context is left as it was before the turn.
    pub async fn chat(&mut self, user_message: &str) -> Result<AgentResponse> {
        let checkpoint = self.checkpoint();
        let result = self.run_turn(user_message).await;
        if result.is_err() {
            self.rollback(checkpoint);
        }
        result
    }

    async fn run_turn(&mut self, user_message: &str) -> Result<AgentResponse> {
        self.context.add_user(user_message);

        let tool_definitions = self.tools.definitions();
        let mut iterations = 0;
        let mut total_tool_calls = 0;
        let mut tool_call_log: Vec<ToolCallLog> = Vec::new();
        let mut usage: Option<TokenUsage> = None;

        // Track duplicate tool results to prevent infinite loops
        let mut last_tool_results: HashMap<String, String> = HashMap::new();
        let mut consecutive_duplicate_calls = 0;

        loop {
            if iterations >= self.max_iterations {
                tracing::warn!("Agent hit max iterations ({})", self.max_iterations);
                self.context.add_assistant(
                    "I've reached the maximum number of steps. Here's what I've done so far. Let me know if you'd like me to continue.",
                );
                break;
            }

            tracing::debug!(
                "Agent step {} (~{} context tokens)",
                iterations + 1,
                self.context.estimate_total_tokens()
            );

            let response = self
                .llm
                .chat(self.context.messages(), Some(&tool_definitions))
                .await?;

            if let Some(step) = response.usage() {
                let total = usage.get_or_insert_with(TokenUsage::default);
                total.input_tokens += step.input_tokens;
                total.output_tokens += step.output_tokens;
                total.total_tokens += step.total_tokens;
            }

            iterations += 1;

            let (text, calls) = match response {
                LlmResponse::Text { text, .. } => (Some(text), Vec::new()),
                LlmResponse::ToolCalls { calls, .. } => (None, calls),
                LlmResponse::Mixed {
                    text, tool_calls, ..
                } => (text, tool_calls),
            };

            if calls.is_empty() {
                let text = text.unwrap_or_default();
                self.context.add_assistant(&text);
                return Ok(AgentResponse {
                    text,
                    tool_calls_made: total_tool_calls,
                    tool_call_log,
                    usage,
                });
            }

            // Limit tool calls per step to prevent runaway loops
            if calls.len() > MAX_TOOL_CALLS_PER_TURN {
                tracing::warn!(
                    "LLM requested {} tools in single step, limiting to {}",
                    calls.len(),
                    MAX_TOOL_CALLS_PER_TURN
                );
            }
            let limited_calls: &[ToolCall] = &calls[..calls.len().min(MAX_TOOL_CALLS_PER_TURN)];
            total_tool_calls += limited_calls.len();

            self.context.add_assistant_tool_calls(
                text.filter(|t| !t.trim().is_empty()),
                limited_calls,
            );

            for (idx, call) in limited_calls.iter().enumerate() {
                tracing::info!(tool = %call.name, args = %call.arguments, "Tool call");

                let result = self
                    .tools
                    .execute(&call.name, call.arguments.clone())
                    .await?;

                if !result.success && result.output.starts_with("Unknown tool") {
                    tracing::warn!("Model requested unavailable tool '{}'", call.name);
                }

                let result_key = format!("{}:{}", call.name, call.arguments);
                if last_tool_results.get(&result_key) == Some(&result.output) {
                    consecutive_duplicate_calls += 1;
                    tracing::warn!(
                        "Tool '{}' returned identical result ({}/{})",
                        call.name,
                        consecutive_duplicate_calls,
                        MAX_CONSECUTIVE_DUPLICATES
                    );
                } else {
                    consecutive_duplicate_calls = 0;
                }
                last_tool_results.insert(result_key, result.output.clone());

                tracing::debug!("Tool result: {:?}", result);

                tool_call_log.push(ToolCallLog {
                    tool: call.name.clone(),
                    args: call.arguments.clone(),
                    result_preview: preview(&result.output),
                    success: result.success,
                });

                self.context.add_tool_result(&call.id, &result.output);

                if consecutive_duplicate_calls >= MAX_CONSECUTIVE_DUPLICATES {
                    // Every requested call still needs a result message
                    for skipped in &limited_calls[idx + 1..] {
                        self.context.add_tool_result(&skipped.id, SKIPPED_CALL_RESULT);
                    }
                    break;
                }
            }

            if consecutive_duplicate_calls >= MAX_CONSECUTIVE_DUPLICATES {
                self.context.add_assistant(
                    "I'm seeing repeated results from tools. Please let me know how you'd like to proceed.",
                );
                break;
            }
        }

        let last_text = self
            .context
            .messages()
            .last()
            .map(|m| m.content.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Done.".to_string());

        Ok(AgentResponse {
            text: last_text,
            tool_calls_made: total_tool_calls,
            tool_call_log,
            usage,
        })
    }
}

fn preview(output: &str) -> String {
    if output.chars().count() > RESULT_PREVIEW_CHARS {
        let cut: String = output.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        output.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Replays a fixed list of responses, then answers "done"
    struct ScriptedLlm {
        responses: Mutex<Vec<LlmResponse>>,
        seen: Mutex<Vec<usize>>,
    }

    impl ScriptedLlm {
        fn new(mut responses: Vec<LlmResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<LlmResponse> {
            self.seen.lock().unwrap().push(messages.len());
            Ok(self.responses.lock().unwrap().pop().unwrap_or(LlmResponse::Text {
                text: "done".into(),
                usage: None,
            }))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, params: Value) -> Result<ToolResult> {
            Ok(ToolResult::value(params))
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn text_reply_without_tools() {
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse::Text {
            text: "hello".into(),
            usage: None,
        }]));
        let mut agent = ChatAgent::new(llm, registry());
        let response = agent.chat("hi").await.unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.tool_calls_made, 0);
    }

    #[tokio::test]
    async fn executes_tools_then_answers() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            LlmResponse::ToolCalls {
                calls: vec![call("c1", "echo", json!({"x": 1}))],
                usage: None,
            },
            LlmResponse::Text {
                text: "x is 1".into(),
                usage: None,
            },
        ]));
        let mut agent = ChatAgent::new(llm, registry());
        let response = agent.chat("what is x").await.unwrap();

        assert_eq!(response.text, "x is 1");
        assert_eq!(response.tool_calls_made, 1);
        assert_eq!(response.tool_call_log[0].tool, "echo");
        assert_eq!(response.tool_call_log[0].result_preview, r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_model() {
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse::ToolCalls {
            calls: vec![call("c1", "drop_db", json!({}))],
            usage: None,
        }]));
        let mut agent = ChatAgent::new(llm, registry());
        let response = agent.chat("go").await.unwrap();
        assert!(!response.tool_call_log[0].success);
        assert_eq!(response.text, "done");
    }

    #[tokio::test]
    async fn caps_tool_calls_per_step() {
        let calls = (0..8)
            .map(|i| call(&format!("c{}", i), "echo", json!({ "i": i })))
            .collect();
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse::ToolCalls {
            calls,
            usage: None,
        }]));
        let mut agent = ChatAgent::new(llm, registry());
        let response = agent.chat("many").await.unwrap();
        assert_eq!(response.tool_calls_made, MAX_TOOL_CALLS_PER_TURN);
    }

    #[tokio::test]
    async fn stops_at_max_iterations() {
        let looping = (0..20)
            .map(|i| LlmResponse::ToolCalls {
                calls: vec![call(&format!("c{}", i), "echo", json!({ "n": i }))],
                usage: None,
            })
            .collect();
        let llm = Arc::new(ScriptedLlm::new(looping));
        let mut agent = ChatAgent::new(llm.clone(), registry()).with_max_iterations(3);
        let response = agent.chat("loop").await.unwrap();

        assert_eq!(llm.seen.lock().unwrap().len(), 3);
        assert!(response.text.contains("maximum number of steps"));
    }

    #[tokio::test]
    async fn repeated_identical_results_break_the_loop() {
        let same = (0..10)
            .map(|i| LlmResponse::ToolCalls {
                calls: vec![call(&format!("c{}", i), "echo", json!({"same": true}))],
                usage: None,
            })
            .collect();
        let llm = Arc::new(ScriptedLlm::new(same));
        let mut agent = ChatAgent::new(llm, registry());
        let response = agent.chat("again").await.unwrap();
        assert!(response.text.contains("repeated results"));
        assert_eq!(response.tool_calls_made, 3);
    }

    #[tokio::test]
    async fn duplicate_break_answers_every_call() {
        let same = (0..10)
            .map(|i| LlmResponse::ToolCalls {
                calls: vec![
                    call(&format!("a{}", i), "echo", json!({"same": true})),
                    call(&format!("b{}", i), "echo", json!({"same": true})),
                ],
                usage: None,
            })
            .collect();
        let llm = Arc::new(ScriptedLlm::new(same));
        let mut agent = ChatAgent::new(llm, registry());
        agent.chat("again").await.unwrap();

        let messages = agent.context().messages();
        let requested: Vec<&str> = messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .collect();
        let answered: Vec<&str> = messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert!(!requested.is_empty());
        assert_eq!(requested, answered);
        assert!(messages.iter().any(|m| m.content == SKIPPED_CALL_RESULT));
    }

    /// Calls a tool first, then fails on the follow-up request
    struct FailsAfterToolLlm {
        steps: Mutex<usize>,
    }

    #[async_trait]
    impl LlmProvider for FailsAfterToolLlm {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<LlmResponse> {
            let mut steps = self.steps.lock().unwrap();
            *steps += 1;
            if *steps == 1 {
                Ok(LlmResponse::ToolCalls {
                    calls: vec![call("c1", "echo", json!({"x": 1}))],
                    usage: None,
                })
            } else {
                Err(crate::llm::LlmError::Unreachable("connection refused".into()).into())
            }
        }
    }

    #[tokio::test]
    async fn failed_turn_rolls_back_context() {
        let llm = Arc::new(FailsAfterToolLlm {
            steps: Mutex::new(0),
        });
        let mut agent = ChatAgent::new(llm, registry());
        let before = agent.context().messages().len();

        assert!(agent.chat("what is x").await.is_err());
        assert_eq!(agent.context().messages().len(), before);
        assert_eq!(agent.context().turn_messages(), 0);
    }

    #[tokio::test]
    async fn usage_is_summed_across_steps() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            LlmResponse::ToolCalls {
                calls: vec![call("c1", "echo", json!({"x": 1}))],
                usage: Some(TokenUsage::new(10, 2)),
            },
            LlmResponse::Text {
                text: "x is 1".into(),
                usage: Some(TokenUsage::new(20, 3)),
            },
        ]));
        let mut agent = ChatAgent::new(llm, registry());
        let usage = agent.chat("what is x").await.unwrap().usage.unwrap();
        assert_eq!(usage.input_tokens, 30);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, 35);

        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let mut agent = ChatAgent::new(llm, registry());
        assert!(agent.chat("hi").await.unwrap().usage.is_none());
    }

    #[tokio::test]
    async fn reset_keeps_only_system_prompt() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let mut agent = ChatAgent::new(llm, registry());
        agent.chat("one").await.unwrap();
        assert!(agent.context().turn_messages() > 0);
        agent.reset();
        assert_eq!(agent.context().turn_messages(), 0);
    }
}
