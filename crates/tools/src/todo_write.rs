//! Todo list tool — track multi-step task progress across a session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use agentichat_core::{ArgMap, Error, ErrorKind, Result, Tool, ToolResult};

use crate::io_error;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TodoItem {
    content: String,
    status: String,
    #[serde(rename = "activeForm")]
    active_form: String,
}

const VALID_STATUSES: &[&str] = &["pending", "in_progress", "completed"];

pub struct TodoWriteTool {
    todo_file: PathBuf,
}

impl TodoWriteTool {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            todo_file: data_dir.join("current_todos.json"),
        }
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Create or update the task list for the current session. Each item has content, a status (pending/in_progress/completed), and an activeForm shown while it runs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "The complete task list to record",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {
                                "type": "string",
                                "description": "Task description (imperative form)"
                            },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"],
                                "description": "Task status"
                            },
                            "activeForm": {
                                "type": "string",
                                "description": "Present-continuous form shown while the task is active"
                            }
                        },
                        "required": ["content", "status", "activeForm"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let raw = arguments
            .get("todos")
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::Unknown, "Missing 'todos' argument"))?;

        let todos: Vec<TodoItem> = serde_json::from_value(raw)
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("Invalid todo list: {e}")))?;

        for (i, todo) in todos.iter().enumerate() {
            if todo.content.trim().is_empty() {
                return Err(Error::new(
                    ErrorKind::Unknown,
                    format!("Todo {}: 'content' is empty", i + 1),
                ));
            }
            if !VALID_STATUSES.contains(&todo.status.as_str()) {
                return Err(Error::new(
                    ErrorKind::Unknown,
                    format!("Todo {}: invalid status '{}'", i + 1, todo.status),
                ));
            }
        }

        if let Some(parent) = self.todo_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("Cannot create data directory", e))?;
        }
        let serialized = serde_json::to_string_pretty(&todos)
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("Cannot serialize todos: {e}")))?;
        tokio::fs::write(&self.todo_file, serialized)
            .await
            .map_err(|e| io_error("Cannot persist todo list", e))?;

        let completed = todos.iter().filter(|t| t.status == "completed").count();

        Ok(ToolResult::ok(serde_json::json!({
            "count": todos.len(),
            "completed": completed,
            "rendered": render(&todos),
        })))
    }
}

fn render(todos: &[TodoItem]) -> String {
    todos
        .iter()
        .map(|t| {
            let marker = match t.status.as_str() {
                "completed" => "[x]",
                "in_progress" => "[~]",
                _ => "[ ]",
            };
            format!("{marker} {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
