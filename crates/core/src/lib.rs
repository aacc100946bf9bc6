//! # Agentichat Core
//!
//! Domain types, traits, and error definitions for the agentichat terminal
//! assistant. This crate has zero framework dependencies beyond the async
//! runtime — it defines the model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem boundary is a trait here (`Backend`, `Tool`).
//! Implementations live in their respective crates, which all depend inward
//! on core. This keeps the dependency graph clean and makes the agent loop
//! testable with scripted mock backends.

pub mod backend;
pub mod error;
pub mod message;
pub mod tokens;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{
    Backend, BackendConfig, ChatResponse, FinishReason, ProviderKind, RetryInfo, TokenUsage,
};
pub use error::{Error, ErrorKind, Result};
pub use message::{Conversation, Message, Role, ToolCall, UsageTotals};
pub use tool::{ArgMap, ConfirmPolicy, Tool, ToolFailure, ToolRegistry, ToolResult};
