//! Conversation context management

use crate::llm::{Message, Role, ToolCall};

/// Default max tokens (conservative estimate for small local models)
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 32_000;

/// Max tokens for a single tool result (a wide `SELECT *` can be large)
const MAX_TOOL_RESULT_TOKENS: usize = 4_000;

/// Manages conversation history and context
pub struct ConversationContext {
    messages: Vec<Message>,
    max_messages: usize,
    max_context_tokens: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationContext {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            max_messages: 100,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
        }
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    pub fn with_max_context_tokens(mut self, max: usize) -> Self {
        self.max_context_tokens = max;
        self
    }

    /// Add a system message
    pub fn add_system(&mut self, content: impl Into<String>) {
        self.messages.push(Message::system(content));
        self.trim();
    }

    /// Add a user message
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
        self.trim();
    }

    /// Add an assistant message
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
        self.trim();
    }

    /// Add an assistant message with tool calls (must precede their results)
    pub fn add_assistant_tool_calls(&mut self, text: Option<String>, tool_calls: &[ToolCall]) {
        self.messages
            .push(Message::assistant_tool_calls(text, tool_calls.to_vec()));
        self.trim();
    }

    /// Add a tool result (auto-truncates if too large)
    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, result: impl Into<String>) {
        let result_str = result.into();
        let truncated = Self::truncate_if_needed(&result_str, MAX_TOOL_RESULT_TOKENS);
        self.messages
            .push(Message::tool_result(tool_call_id, truncated));
        self.trim();
        self.trim_by_tokens();
    }

    /// Truncate text if it exceeds token limit
    fn truncate_if_needed(text: &str, max_tokens: usize) -> String {
        if Self::estimate_tokens(text) <= max_tokens {
            return text.to_string();
        }

        // ~4 chars per token
        let max_chars = max_tokens * 4;
        let truncated: String = text.chars().take(max_chars).collect();

        format!(
            "{}\n\n... [TRUNCATED: result exceeded {} tokens. Narrow the query with WHERE or LIMIT.]",
            truncated, max_tokens
        )
    }

    /// Estimate tokens in text (~4 chars per token for English)
    pub fn estimate_tokens(text: &str) -> usize {
        (text.len() + 3) / 4
    }

    /// Estimate total tokens in context
    pub fn estimate_total_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| {
                Self::estimate_tokens(&m.content)
                    + m.tool_calls
                        .iter()
                        .map(|tc| Self::estimate_tokens(&tc.arguments.to_string()))
                        .sum::<usize>()
            })
            .sum()
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of non-system messages
    pub fn turn_messages(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count()
    }

    /// Drop everything except system messages
    pub fn clear_history(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    /// Copy of the current messages, for [`restore`](Self::restore)
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Put back messages taken with [`snapshot`](Self::snapshot)
    pub fn restore(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Trim messages to max size, keeping system messages
    fn trim(&mut self) {
        if self.messages.len() <= self.max_messages {
            return;
        }

        let (system, rest): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.role == Role::System);

        let keep_count = self.max_messages.saturating_sub(system.len());
        let skip_count = rest.len().saturating_sub(keep_count);

        self.messages = system;
        self.messages.extend(rest.into_iter().skip(skip_count));
    }

    /// Trim oldest non-system messages while total tokens exceed the limit,
    /// always keeping the newest message
    fn trim_by_tokens(&mut self) {
        while self.estimate_total_tokens() > self.max_context_tokens && self.turn_messages() > 1 {
            match self.messages.iter().position(|m| m.role != Role::System) {
                Some(idx) => {
                    self.messages.remove(idx);
                }
                None => break,
            }
        }
    }
}
