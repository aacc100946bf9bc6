//! Tool trait and registry — the abstraction over agent capabilities.
//!
//! Tools are what let the model act on the workspace: list and edit files,
//! run shell commands, fetch the web, keep a todo list. Each tool declares a
//! JSON schema for its parameters and a confirmation policy; the registry
//! dispatches invocations and turns every failure into a structured result
//! the model can react to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, ErrorKind, Result};
use crate::message::ToolCall;

/// When a tool invocation must be confirmed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmPolicy {
    /// Run without asking.
    Never,
    /// Ask because the tool mutates the workspace or runs commands.
    OnDestructive,
    /// Always ask.
    Always,
}

/// A keyed argument map, as extracted from the model's tool call.
pub type ArgMap = serde_json::Map<String, serde_json::Value>;

/// Structured failure payload embedded in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// The outcome of a tool invocation, serialized into the conversation as a
/// `tool`-role message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool body ran to completion.
    pub success: bool,

    /// Tool-specific payload fields, flattened into the serialized object.
    #[serde(flatten)]
    pub payload: ArgMap,

    /// Failure details when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,

    /// Set when the loop shortened the payload to fit the result cap.
    #[serde(rename = "_truncated", default, skip_serializing_if = "is_false")]
    pub truncated: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolResult {
    /// A successful result. `payload` must be a JSON object.
    pub fn ok(payload: serde_json::Value) -> Self {
        let payload = match payload {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = ArgMap::new();
                map.insert("result".into(), other);
                map
            }
        };
        Self {
            success: true,
            payload,
            error: None,
            truncated: false,
        }
    }

    /// A failed result with a categorized error.
    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: ArgMap::new(),
            error: Some(ToolFailure {
                kind,
                message: message.into(),
            }),
            truncated: false,
        }
    }

    /// Convert an `Error` into a failed result.
    pub fn from_error(err: &Error) -> Self {
        Self::fail(err.kind, err.message.clone())
    }

    /// Serialize for insertion into a `tool` message.
    pub fn render(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"success\":false}".into())
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "read_file", "shell_exec").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Confirmation policy for this tool.
    fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy::Never
    }

    /// Execute the tool with validated arguments.
    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult>;
}

/// A registry of available tools.
///
/// Immutable after setup, except that `schemas()` memoizes the rendered
/// JSON-schema array (the agent loop asks for it once per iteration) and
/// `register` invalidates the memo.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    schemas: Mutex<Option<Arc<Vec<serde_json::Value>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            schemas: Mutex::new(None),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name and
    /// invalidates the schema memo.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
        *self.schemas.lock().unwrap() = None;
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// (name, description) pairs sorted by name, for system prompt assembly.
    pub fn catalogue(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Confirmation policy for a registered tool.
    pub fn confirm_policy(&self, name: &str) -> Option<ConfirmPolicy> {
        self.get(name).map(|t| t.confirm_policy())
    }

    /// The JSON function-descriptor array consumed by backends, memoized.
    pub fn schemas(&self) -> Arc<Vec<serde_json::Value>> {
        let mut memo = self.schemas.lock().unwrap();
        if let Some(cached) = memo.as_ref() {
            return Arc::clone(cached);
        }
        let mut rendered: Vec<(String, serde_json::Value)> = self
            .tools
            .values()
            .map(|t| {
                (
                    t.name().to_string(),
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name(),
                            "description": t.description(),
                            "parameters": t.parameters_schema(),
                        }
                    }),
                )
            })
            .collect();
        rendered.sort_by(|a, b| a.0.cmp(&b.0));
        let schemas = Arc::new(rendered.into_iter().map(|(_, v)| v).collect::<Vec<_>>());
        *memo = Some(Arc::clone(&schemas));
        schemas
    }

    /// Execute a tool call. Never panics and never propagates an error:
    /// unknown tools, bad arguments, and tool failures all become failed
    /// `ToolResult`s so the model can recover.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            return ToolResult::fail(
                ErrorKind::ToolNotAvailable,
                format!("Tool '{}' is not available", call.name),
            );
        };

        if let Err(missing) = check_required(&tool.parameters_schema(), &call.arguments) {
            return ToolResult::fail(
                ErrorKind::Unknown,
                format!("Missing required parameter '{missing}' for tool '{}'", call.name),
            );
        }

        match tool.execute(&call.arguments).await {
            Ok(result) => result,
            Err(err) => ToolResult::from_error(&err),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate that every schema-required parameter is present.
fn check_required(schema: &serde_json::Value, args: &ArgMap) -> std::result::Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    for key in required {
        if let Some(key) = key.as_str() {
            if !args.contains_key(key) {
                return Err(key.to_string());
            }
        }
    }
    Ok(())
}
