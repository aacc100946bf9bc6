//! Built-in tool implementations for agentichat.
//!
//! Tools give the model the ability to act on the workspace: list, read and
//! edit files, search text, run shell commands, fetch the web, and keep a
//! todo list. Every file-touching tool consults the sandbox before any I/O;
//! destructive tools declare an `on_destructive` confirmation policy so the
//! loop can route them through the confirmation manager.

pub mod copy_file;
pub mod create_directory;
pub mod delete_directory;
pub mod delete_file;
pub mod glob_search;
pub mod list_files;
pub mod move_file;
pub mod read_file;
pub mod search_text;
pub mod shell_exec;
pub mod todo_write;
pub mod web_fetch;
pub mod web_search;
pub mod write_file;

use std::path::Path;
use std::sync::Arc;

use agentichat_core::{ArgMap, Error, ErrorKind, Result, ToolRegistry};
use agentichat_sandbox::Sandbox;

/// Confirmation toggles from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmToggles {
    /// Confirm file writes, deletions, and moves.
    pub text_operations: bool,
    /// Confirm shell invocations.
    pub shell_commands: bool,
}

impl Default for ConfirmToggles {
    fn default() -> Self {
        Self {
            text_operations: true,
            shell_commands: true,
        }
    }
}

/// Create a registry with all built-in tools.
pub fn default_registry(
    sandbox: Arc<Sandbox>,
    data_dir: &Path,
    confirm: ConfirmToggles,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(list_files::ListFilesTool::new(sandbox.clone())));
    registry.register(Box::new(read_file::ReadFileTool::new(sandbox.clone())));
    registry.register(Box::new(write_file::WriteFileTool::new(
        sandbox.clone(),
        confirm.text_operations,
    )));
    registry.register(Box::new(delete_file::DeleteFileTool::new(
        sandbox.clone(),
        confirm.text_operations,
    )));
    registry.register(Box::new(search_text::SearchTextTool::new(sandbox.clone())));
    registry.register(Box::new(glob_search::GlobSearchTool::new(sandbox.clone())));
    registry.register(Box::new(create_directory::CreateDirectoryTool::new(sandbox.clone())));
    registry.register(Box::new(delete_directory::DeleteDirectoryTool::new(
        sandbox.clone(),
        confirm.text_operations,
    )));
    registry.register(Box::new(move_file::MoveFileTool::new(
        sandbox.clone(),
        confirm.text_operations,
    )));
    registry.register(Box::new(copy_file::CopyFileTool::new(sandbox.clone())));
    registry.register(Box::new(web_fetch::WebFetchTool::new()));
    registry.register(Box::new(web_search::WebSearchTool::new()));
    registry.register(Box::new(shell_exec::ShellExecTool::new(
        sandbox,
        confirm.shell_commands,
    )));
    registry.register(Box::new(todo_write::TodoWriteTool::new(data_dir)));

    registry
}

// ── Argument helpers shared by the tool bodies ───────────────────────────

pub(crate) fn required_str<'a>(args: &'a ArgMap, key: &str) -> Result<&'a str> {
    args.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        Error::new(ErrorKind::Unknown, format!("Missing or invalid '{key}' argument"))
    })
}

pub(crate) fn optional_str<'a>(args: &'a ArgMap, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub(crate) fn optional_bool(args: &ArgMap, key: &str, default: bool) -> bool {
    match args.get(key) {
        Some(serde_json::Value::Bool(b)) => *b,
        // Extracted XML arguments arrive as strings.
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => default,
    }
}

pub(crate) fn optional_u64(args: &ArgMap, key: &str) -> Option<u64> {
    match args.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Map a filesystem error onto the taxonomy.
pub(crate) fn io_error(context: &str, e: std::io::Error) -> Error {
    let kind = match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::Unknown,
    };
    Error::new(kind, format!("{context}: {e}"))
}
