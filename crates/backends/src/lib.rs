//! Backend adapters for agentichat.
//!
//! Two wire protocols cover every configured provider: the OpenAI-compatible
//! chat-completions convention (`remote`) and the native local server
//! protocol (`local`). Both share the tolerant tool-call extraction pipeline
//! and the retry/backoff executor.

pub mod extract;
pub mod ollama;
pub mod openai_compat;
pub mod retry;

use std::sync::Arc;

use agentichat_core::{Backend, BackendConfig, FinishReason, ProviderKind, Result, ToolCall};

pub use extract::extract_tool_calls;
pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use retry::RetryPolicy;

/// Build a backend from a named configuration entry.
pub fn build_backend(name: &str, config: BackendConfig) -> Result<Arc<dyn Backend>> {
    Ok(match config.provider {
        ProviderKind::Local => Arc::new(OllamaBackend::new(name, config)?),
        ProviderKind::Remote => Arc::new(OpenAiCompatBackend::new(name, config)?),
    })
}

/// Truncate a tool-call list to the model's parallel-call limit.
pub(crate) fn limit_tool_calls(mut calls: Vec<ToolCall>, max: Option<usize>) -> Vec<ToolCall> {
    if let Some(max) = max {
        if max > 0 && calls.len() > max {
            tracing::info!(limit = max, dropped = calls.len() - max, "Limiting parallel tool calls");
            calls.truncate(max);
        }
    }
    calls
}

/// Resolve the finish reason: any tool calls win, otherwise the provider's
/// reported reason (defaulting to `stop`).
pub(crate) fn finish_reason_for(calls: &[ToolCall], reported: Option<&str>) -> FinishReason {
    if !calls.is_empty() {
        FinishReason::ToolCalls
    } else {
        reported.map(FinishReason::parse).unwrap_or(FinishReason::Stop)
    }
}
