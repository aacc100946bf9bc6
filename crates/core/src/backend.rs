//! Backend trait — the abstraction over LLM providers.
//!
//! A backend knows how to send a conversation to an LLM and get a response
//! back, either complete or as a stream of text chunks. The agent loop only
//! ever calls the non-streaming `chat`; streaming is reserved for final
//! replies that carry no tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::message::{Message, ToolCall, UsageTotals};

/// Which wire protocol a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Native local server protocol (Ollama `/api/chat`).
    Local,
    /// OpenAI-compatible chat-completions endpoint.
    #[serde(alias = "remote-1", alias = "openai", alias = "vllm")]
    Remote,
}

/// Configuration for one backend entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Provider variant.
    #[serde(rename = "type")]
    pub provider: ProviderKind,

    /// HTTP endpoint base URL.
    pub url: String,

    /// Model identifier.
    pub model: String,

    /// Bearer credential, when the provider requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Total per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Response token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context token budget used by request trimming. Unset disables trimming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_max_tokens: Option<usize>,

    /// 1 forces strictly sequential tool calls; unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_tools: Option<usize>,
}

fn default_timeout() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
}

impl FinishReason {
    /// Map a provider-reported finish reason string; unknown values fall
    /// back to `Stop`.
    pub fn parse(s: &str) -> Self {
        match s {
            "length" => Self::Length,
            "tool_calls" => Self::ToolCalls,
            _ => Self::Stop,
        }
    }
}

/// Token usage for a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A complete (non-streaming) response from a backend.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Assistant text content (may be empty when only tool calls are present).
    pub content: String,

    /// Tool calls, normalized to the internal representation regardless of
    /// which surface format the model used.
    pub tool_calls: Vec<ToolCall>,

    /// Reported cause of termination.
    pub finish_reason: FinishReason,

    /// Usage statistics when the provider reports them.
    pub usage: Option<TokenUsage>,
}

/// Transient retry state, observable by the UI during backoff waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInfo {
    /// Attempt that just failed (1-based).
    pub attempt: u32,

    /// Total attempts the policy allows.
    pub max_attempts: u32,

    /// Seconds until the next attempt.
    pub delay_secs: u64,
}

/// The backend trait. One instance serves one configured provider entry;
/// no concurrent requests are issued against a single instance.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the configuration entry this backend was built from.
    fn name(&self) -> &str;

    /// The active configuration.
    fn config(&self) -> &BackendConfig;

    /// The model id in use.
    fn model(&self) -> &str {
        &self.config().model
    }

    /// Send the conversation and tool schemas, get a complete response.
    /// Retries with backoff on transient failures are handled inside the
    /// adapter; callers see a success or a final error.
    async fn chat(&self, messages: &[Message], tools: &[serde_json::Value]) -> Result<ChatResponse>;

    /// Stream a plain text reply as chunks. Never retried.
    ///
    /// The default implementation performs a regular `chat` call and yields
    /// the full content as a single chunk.
    async fn stream(&self, messages: &[Message]) -> Result<mpsc::Receiver<Result<String>>> {
        let response = self.chat(messages, &[]).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(response.content)).await;
        Ok(rx)
    }

    /// List models available on this backend.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Can we reach the provider?
    async fn health_check(&self) -> bool;

    /// Release the HTTP session. Called once at shutdown.
    async fn close(&self) {}

    /// Tokens accumulated since the last `reset_usage`.
    fn usage(&self) -> UsageTotals {
        UsageTotals::default()
    }

    /// Reset the per-turn usage counters.
    fn reset_usage(&self) {}

    /// Observe retry state transitions. Holds `None` outside backoff waits.
    fn retry_updates(&self) -> watch::Receiver<Option<RetryInfo>> {
        let (_tx, rx) = watch::channel(None);
        rx
    }
}
