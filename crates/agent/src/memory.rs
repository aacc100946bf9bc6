//! Memory manager — context-budget trimming, warnings, and compression.
//!
//! Two separate concerns share this module. Trimming builds a smaller
//! request-side copy of the conversation so each backend call fits the
//! model's context window; the canonical log is never touched. Compression
//! destructively replaces the conversation prefix with one LLM-written
//! summary message, either on user request or automatically past the
//! configured thresholds.

use tracing::{debug, info};

use agentichat_core::tokens::estimate_messages_tokens;
use agentichat_core::{Backend, Error, ErrorKind, Message, Result, Role};

/// Fraction of the context budget a request may use; the rest is headroom
/// for the response and tool schemas.
const BUDGET_RATIO: f64 = 0.80;

/// Tool messages longer than this are inline-shrunk on the request side.
const TOOL_SHRINK_THRESHOLD: usize = 2_000;

/// Characters kept from each end when inline-shrinking.
const TOOL_SHRINK_KEEP: usize = 500;

/// The trimmer always keeps at least this many trailing non-system messages.
const MIN_TAIL_MESSAGES: usize = 4;

/// Compression refuses to run on fewer messages than this.
const MIN_COMPRESSIBLE: usize = 4;

/// System prompt for the summarization call.
const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the conversation you are given into a concise but complete resume. \
Be factual and neutral. Keep every important point, decision, file path, and error message; \
the summary will be the only context available to continue the conversation. \
Answer with the summary text only.";

/// Compression thresholds and switches.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Trigger compression automatically.
    pub auto_enabled: bool,
    /// Message count at which the conversation is considered full.
    pub auto_threshold: usize,
    /// Messages preserved after automatic compression.
    pub auto_keep: usize,
    /// Fraction of the threshold at which a warning is shown.
    pub warning_threshold: f64,
    /// Hard message ceiling; reaching it forces compression.
    pub max_messages: Option<usize>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            auto_enabled: false,
            auto_threshold: 20,
            auto_keep: 5,
            warning_threshold: 0.75,
            max_messages: None,
        }
    }
}

/// A one-line usage notice for the host to print after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageWarning {
    pub count: usize,
    pub threshold: usize,
    /// Percentage of the threshold currently used.
    pub percent: u32,
    /// How far past the threshold, when over it.
    pub over_percent: Option<u32>,
}

/// What a compression pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionOutcome {
    Compressed { removed: usize, kept: usize },
    Skipped { reason: String },
}

pub struct MemoryManager {
    compression: CompressionConfig,
}

impl MemoryManager {
    pub fn new(compression: CompressionConfig) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> &CompressionConfig {
        &self.compression
    }

    // ── Trimming (non-destructive, per request) ──────────────────────────

    /// Build the request-side message list. With no budget configured the
    /// log is passed through unchanged. Otherwise tool outputs are
    /// inline-shrunk first, then history is elided oldest-first until the
    /// estimate fits 80% of the budget, always keeping the system message
    /// and the last four non-system messages.
    pub fn trim_for_request(&self, messages: &[Message], budget: Option<usize>) -> Vec<Message> {
        let Some(budget) = budget else {
            return messages.to_vec();
        };
        let target = (budget as f64 * BUDGET_RATIO) as usize;

        // Phase A: inline-shrink oversized tool outputs.
        let mut request: Vec<Message> = messages.iter().map(shrink_tool_message).collect();
        if estimate_messages_tokens(&request) <= target {
            return request;
        }

        // Phase B: elide history from the oldest end.
        let system_count = request
            .first()
            .map(|m| usize::from(m.role == Role::System))
            .unwrap_or(0);

        while estimate_messages_tokens(&request) > target {
            let non_system = request.len() - system_count;
            if non_system <= MIN_TAIL_MESSAGES {
                break;
            }
            let dropped = request.remove(system_count);
            debug!(role = ?dropped.role, "Trimming dropped oldest message from request");
        }

        request
    }

    // ── Warnings and auto-compression policy ─────────────────────────────

    /// Compute the usage warning for the current message count, if the
    /// warning ratio has been reached.
    pub fn check_usage(&self, count: usize) -> Option<UsageWarning> {
        let threshold = self.compression.auto_threshold;
        if threshold == 0 {
            return None;
        }

        let ratio = count as f64 / threshold as f64;
        if ratio < self.compression.warning_threshold {
            return None;
        }

        let over_percent = if count >= threshold {
            Some(((ratio - 1.0) * 100.0).round() as u32)
        } else {
            None
        };

        Some(UsageWarning {
            count,
            threshold,
            percent: (ratio * 100.0).round() as u32,
            over_percent,
        })
    }

    /// Whether the auto-compression policy fires at this message count.
    pub fn should_auto_compress(&self, count: usize) -> bool {
        if !self.compression.auto_enabled {
            return false;
        }
        let limit = self
            .compression
            .max_messages
            .unwrap_or(self.compression.auto_threshold);
        limit > 0 && count >= limit
    }

    // ── Compression (destructive) ────────────────────────────────────────

    /// Replace everything except the most recent `keep` messages with one
    /// assistant summary message produced by the backend. `max` bounds the
    /// post-compression conversation length.
    pub async fn compress(
        &self,
        backend: &dyn Backend,
        messages: &mut Vec<Message>,
        keep: Option<usize>,
        max: Option<usize>,
    ) -> Result<CompressionOutcome> {
        let mut keep = keep.unwrap_or(self.compression.auto_keep);
        if let Some(max) = max {
            keep = keep.min(max.saturating_sub(1));
        }

        if messages.len() < MIN_COMPRESSIBLE {
            return Ok(CompressionOutcome::Skipped {
                reason: format!("not enough messages to compress (minimum {MIN_COMPRESSIBLE})"),
            });
        }
        if keep >= messages.len() {
            return Ok(CompressionOutcome::Skipped {
                reason: format!("already at {} messages (<= keep {})", messages.len(), keep),
            });
        }

        let split = messages.len() - keep;
        let prefix = &messages[..split];

        let transcript = render_transcript(prefix);
        let request = vec![
            Message::system(SUMMARY_SYSTEM_PROMPT),
            Message::user(transcript),
        ];

        let response = backend.chat(&request, &[]).await?;
        let summary = response.content.trim().to_string();
        if summary.is_empty() {
            return Err(Error::new(
                ErrorKind::Unknown,
                "The model produced an empty summary; conversation left unchanged",
            ));
        }

        let summary_message = Message::assistant(format!(
            "[Summary of the earlier conversation]\n\n{summary}\n\n[End of summary — the conversation continues below]"
        ));

        let removed = split;
        let tail: Vec<Message> = messages.split_off(split);
        messages.clear();
        messages.push(summary_message);
        messages.extend(tail);

        info!(removed, kept = keep, "Compressed conversation prefix into summary");
        Ok(CompressionOutcome::Compressed { removed, kept: keep })
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

/// Phase A shrink: request-side copy of a tool message with the middle of
/// its content elided.
fn shrink_tool_message(message: &Message) -> Message {
    if message.role != Role::Tool || message.content.len() <= TOOL_SHRINK_THRESHOLD {
        return message.clone();
    }

    let content = &message.content;
    let head_end = floor_char_boundary(content, TOOL_SHRINK_KEEP);
    let tail_start = ceil_char_boundary(content, content.len() - TOOL_SHRINK_KEEP);
    let elided = content.len() - head_end - (content.len() - tail_start);

    let mut shrunk = message.clone();
    shrunk.content = format!(
        "{}\n... [{elided} characters elided] ...\n{}",
        &content[..head_end],
        &content[tail_start..]
    );
    shrunk
}

/// Render messages as a plain transcript for the summarization call.
/// Tool outputs are clipped so the summary request stays small.
fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let (label, clip) = match message.role {
            Role::System => ("System", 300),
            Role::User => ("User", usize::MAX),
            Role::Assistant => ("Assistant", usize::MAX),
            Role::Tool => ("Tool result", 300),
        };
        let content = if message.content.len() > clip {
            let end = floor_char_boundary(&message.content, clip);
            format!("{}...", &message.content[..end])
        } else {
            message.content.clone()
        };
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&content);
        for call in &message.tool_calls {
            out.push_str(&format!("\n  [called {}]", call.name));
        }
        out.push('\n');
    }
    out
}

pub(crate) fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

pub(crate) fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}
