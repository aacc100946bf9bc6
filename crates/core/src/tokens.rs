//! Token estimation utilities.
//!
//! Character-based heuristic: ~3 characters per token, which undercounts on
//! purpose so the trimmer errs toward smaller requests. The 20% headroom the
//! memory manager keeps below the context budget absorbs the drift.

use crate::message::Message;

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 3;

/// Per-message overhead for role names, delimiters, and wire framing.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens for a single message: overhead plus content plus the
/// serialized arguments of any tool calls it carries.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut total = MESSAGE_OVERHEAD + estimate_tokens(&message.content);
    for call in &message.tool_calls {
        total += estimate_tokens(&call.name);
        let args = serde_json::to_string(&call.arguments).unwrap_or_default();
        total += estimate_tokens(&args);
    }
    total
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
