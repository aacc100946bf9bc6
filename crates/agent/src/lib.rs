//! The agent engine — loop, confirmation policy, and memory management.
//!
//! One turn flows as: trim the request to the context budget, call the
//! backend, execute any tool calls it returns (each gated by the
//! confirmation manager and truncated to the result cap), inject the
//! results, and iterate until the model answers in plain text or the
//! iteration ceiling fails the turn.

pub mod confirm;
pub mod loop_runner;
pub mod memory;

pub use confirm::{ConfirmAnswer, ConfirmationManager, ConfirmationMode, ConfirmationPrompt};
pub use loop_runner::AgentLoop;
pub use memory::{CompressionConfig, CompressionOutcome, MemoryManager, UsageWarning};
