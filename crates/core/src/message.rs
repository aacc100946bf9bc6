//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the whole system: the user
//! writes a message, the agent loop sends the conversation to a backend, the
//! backend may answer with tool calls, and tool results re-enter the log as
//! `tool`-role messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (tool inventory, rules)
    System,
    /// The end user
    User,
    /// The LLM
    Assistant,
    /// Tool execution result
    Tool,
}

/// A tool invocation requested by the model.
///
/// Arguments are kept as a JSON object internally; backend adapters
/// serialize them to a string (OpenAI wire) or pass them through as a
/// nested map (Ollama wire) as the provider expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id, unique within a turn.
    pub id: String,

    /// Name of the tool to invoke.
    pub name: String,

    /// Arguments as a keyed map.
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    /// Create a tool call with a freshly generated id.
    pub fn new(name: impl Into<String>, arguments: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content (may be empty on assistant messages that only
    /// carry tool calls)
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message answering a prior tool call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }
}

/// Cumulative token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub api_calls: u64,
}

impl UsageTotals {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The in-memory conversation: an append-only message log plus a small
/// metadata block. Not persisted across process restarts.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Ordered messages, appended in causal order.
    pub messages: Vec<Message>,

    /// When this session started.
    pub started_at: DateTime<Utc>,

    /// Model id of the active backend, when known.
    pub model: Option<String>,

    /// Tokens accumulated across the session.
    pub usage: UsageTotals,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            started_at: Utc::now(),
            model: None,
            usage: UsageTotals::default(),
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Number of messages in the log.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Wipe the log and counters. The session start time is refreshed.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.usage = UsageTotals::default();
        self.started_at = Utc::now();
    }

    /// Record usage from one completed turn.
    pub fn record_usage(&mut self, prompt_tokens: u64, completion_tokens: u64, api_calls: u64) {
        self.usage.prompt_tokens += prompt_tokens;
        self.usage.completion_tokens += completion_tokens;
        self.usage.api_calls += api_calls;
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
