//! Chat agent with tool execution, and the sessions built on it

mod chat;
mod context;
mod reasoning;
mod session;

pub use chat::{AgentResponse, ChatAgent, Checkpoint, ToolCallLog, DEFAULT_SYSTEM_PROMPT};
pub use context::ConversationContext;
pub use reasoning::{clean_reply, strip_reasoning, NO_RESPONSE};
pub use session::{
    ChatMessage, ChatRole, ChatSession, SessionFactory, TurnError, TurnOutcome, ERROR_PREFIX,
};
