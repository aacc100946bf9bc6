//! The agent loop — bounded model↔tool iteration.
//!
//! One `run` call processes one user turn: send the conversation to the
//! backend, execute any tool calls it answers with (confirmation-gated,
//! results truncated and re-injected as `tool` messages), and repeat until
//! the model replies without tool calls or the iteration ceiling is hit.

use std::sync::Arc;
use tracing::{debug, info, warn};

use agentichat_core::{
    Backend, ConfirmPolicy, Conversation, Error, ErrorKind, FinishReason, Message, Result, Role,
    ToolCall, ToolRegistry, ToolResult,
};

use crate::confirm::ConfirmationManager;
use crate::memory::{ceil_char_boundary, floor_char_boundary, MemoryManager};

/// Default iteration ceiling per turn.
const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default cap on a serialized tool result, in characters.
const DEFAULT_RESULT_CAP: usize = 8_000;

/// Synthetic user message sent after a token-limit truncation.
const TRUNCATION_NUDGE: &str =
    "[System] Your response was truncated; please produce a more concise answer.";

pub struct AgentLoop {
    backend: Arc<dyn Backend>,
    registry: Arc<ToolRegistry>,
    memory: MemoryManager,
    max_iterations: u32,
    result_cap: usize,
    parallel_tools: bool,
    system_prompt: Option<String>,
}

impl AgentLoop {
    /// Create the loop. The system prompt is pre-built here, once, when the
    /// registry has tools.
    pub fn new(backend: Arc<dyn Backend>, registry: Arc<ToolRegistry>, memory: MemoryManager) -> Self {
        let system_prompt = if registry.is_empty() {
            None
        } else {
            Some(build_system_prompt(&registry))
        };

        Self {
            backend,
            registry,
            memory,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            result_cap: DEFAULT_RESULT_CAP,
            parallel_tools: false,
            system_prompt,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = cap;
        self
    }

    /// Allow concurrent execution of a call batch when no call in it can
    /// prompt the user. Off by default; sequential is always correct.
    pub fn with_parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// The pre-built session system prompt, when the registry has tools.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Process the conversation until the model produces a final reply.
    ///
    /// The conversation is the canonical log: every assistant message and
    /// tool result is appended in causal order. Request trimming works on
    /// a copy and never mutates it.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        confirmations: &mut ConfirmationManager,
    ) -> Result<String> {
        if let Some(prompt) = &self.system_prompt {
            let has_system = conversation
                .messages
                .first()
                .map(|m| m.role == Role::System)
                .unwrap_or(false);
            if !has_system {
                conversation.messages.insert(0, Message::system(prompt.clone()));
            }
        }

        let schemas = self.registry.schemas();
        let budget = self.backend.config().context_max_tokens;

        for iteration in 1..=self.max_iterations {
            let request = self.memory.trim_for_request(&conversation.messages, budget);
            debug!(
                iteration,
                canonical = conversation.messages.len(),
                request = request.len(),
                "Agent loop iteration"
            );

            let response = self.backend.chat(&request, &schemas).await?;

            if response.finish_reason == FinishReason::Length && response.tool_calls.is_empty() {
                warn!("Response hit the token limit; asking for a concise continuation");
                conversation.push(Message::assistant(&response.content));
                conversation.push(Message::user(TRUNCATION_NUDGE));
                continue;
            }

            if response.tool_calls.is_empty() {
                conversation.push(Message::assistant(&response.content));
                return Ok(response.content);
            }

            debug!(count = response.tool_calls.len(), "Executing tool calls");
            conversation.push(Message::assistant_with_calls(
                &response.content,
                response.tool_calls.clone(),
            ));

            let results = self.execute_calls(&response.tool_calls, confirmations).await;
            for (call, result) in response.tool_calls.iter().zip(results) {
                conversation.push(Message::tool_result(&call.id, result.render()));
            }
        }

        Err(Error::new(
            ErrorKind::MaxIterations,
            format!("Agent loop reached the {}-iteration ceiling", self.max_iterations),
        ))
    }

    /// Execute one batch of tool calls, in call order. Runs concurrently
    /// only when enabled, the model allows parallel calls, and no call in
    /// the batch could prompt.
    async fn execute_calls(
        &self,
        calls: &[ToolCall],
        confirmations: &mut ConfirmationManager,
    ) -> Vec<ToolResult> {
        let prompts_possible = confirmations.would_prompt()
            && calls.iter().any(|c| self.needs_confirmation(c));
        let can_parallel = self.parallel_tools
            && calls.len() > 1
            && self.backend.config().max_parallel_tools != Some(1)
            && !prompts_possible;

        if can_parallel {
            debug!(count = calls.len(), "Executing tool batch concurrently");
            let futures = calls.iter().map(|call| self.registry.execute(call));
            let mut results = futures::future::join_all(futures).await;
            for result in &mut results {
                truncate_result(result, self.result_cap);
            }
            return results;
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let approved = !self.needs_confirmation(call)
                || confirmations.confirm(&call.name, &call.arguments).await;

            let result = if approved {
                let mut result = self.registry.execute(call).await;
                truncate_result(&mut result, self.result_cap);
                result
            } else {
                info!(tool = %call.name, "User rejected tool invocation");
                ToolResult::fail(ErrorKind::UserRejected, "The user declined this operation.")
            };
            results.push(result);
        }
        results
    }

    fn needs_confirmation(&self, call: &ToolCall) -> bool {
        matches!(
            self.registry.confirm_policy(&call.name),
            Some(ConfirmPolicy::Always | ConfirmPolicy::OnDestructive)
        )
    }
}

/// Render the tool inventory into the session system prompt.
fn build_system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are an AI assistant with access to tools for working with the local \
         filesystem, the web, the shell, and task tracking.\n\n\
         When the user asks for something actionable, call the appropriate tools \
         directly. Do NOT explain to the user how they could use the tools themselves.\n\n\
         Available tools:\n",
    );
    for (name, description) in registry.catalogue() {
        prompt.push_str(&format!("- {name}: {description}\n"));
    }
    prompt.push_str(
        "\nIf you cannot emit structured tool calls, write one per line as:\n\
         ```json\n{\"name\": \"tool_name\", \"arguments\": {\"param\": \"value\"}}\n```\n",
    );
    prompt
}

/// Shorten an oversized tool result in place (§result cap). The string
/// `content` field is clipped to its head and tail halves with a marker in
/// between; payloads without one fall back to their largest string field.
fn truncate_result(result: &mut ToolResult, cap: usize) {
    let serialized_len = result.render().len();
    if serialized_len <= cap {
        return;
    }

    let key = if result
        .payload
        .get("content")
        .map(|v| v.is_string())
        .unwrap_or(false)
    {
        Some("content".to_string())
    } else {
        result
            .payload
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.len())))
            .max_by_key(|(_, len)| *len)
            .map(|(k, _)| k)
    };
    let Some(key) = key else {
        return;
    };
    let Some(text) = result.payload.get(&key).and_then(|v| v.as_str()).map(String::from) else {
        return;
    };

    let overhead = serialized_len.saturating_sub(text.len());
    let keep = cap.saturating_sub(overhead) / 2;
    if text.len() <= keep * 2 {
        return;
    }

    let head_end = floor_char_boundary(&text, keep);
    let tail_start = ceil_char_boundary(&text, text.len() - keep);
    let omitted = tail_start - head_end;

    let replacement = format!(
        "{}\n... [{omitted} characters truncated] ...\n{}",
        &text[..head_end],
        &text[tail_start..]
    );
    result.payload.insert(key, serde_json::Value::String(replacement));
    result.truncated = true;
}
