//! Read file tool — size-checked reads with an optional line slice.

use async_trait::async_trait;
use std::sync::Arc;

use agentichat_core::{ArgMap, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{io_error, optional_u64, required_str};

pub struct ReadFileTool {
    sandbox: Arc<Sandbox>,
}

impl ReadFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Optionally slice to a 1-based inclusive line range."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File to read, relative to the workspace"
                },
                "start_line": {
                    "type": "integer",
                    "description": "First line to include (1-based)"
                },
                "end_line": {
                    "type": "integer",
                    "description": "Last line to include (inclusive)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let path = required_str(arguments, "path")?;
        let start_line = optional_u64(arguments, "start_line").map(|n| n as usize);
        let end_line = optional_u64(arguments, "end_line").map(|n| n as usize);

        let resolved = self.sandbox.resolve(path)?;
        self.sandbox.check_size(&resolved)?;

        let text = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| io_error(&format!("Cannot read '{path}'"), e))?;

        let lines_total = text.lines().count();
        let content = match (start_line, end_line) {
            (None, None) => text,
            (start, end) => {
                let start = start.unwrap_or(1).max(1);
                let end = end.unwrap_or(lines_total);
                text.lines()
                    .skip(start.saturating_sub(1))
                    .take(end.saturating_sub(start - 1))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        let mut payload = serde_json::json!({
            "path": path,
            "content": content,
            "lines_total": lines_total,
        });
        if let Some(start) = start_line {
            payload["start_line"] = serde_json::json!(start);
        }
        if let Some(end) = end_line {
            payload["end_line"] = serde_json::json!(end);
        }

        Ok(ToolResult::ok(payload))
    }
}
