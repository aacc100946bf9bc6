//! Write file tool — create, overwrite, or append with path validation.

use async_trait::async_trait;
use std::sync::Arc;

use agentichat_core::{ArgMap, ConfirmPolicy, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{io_error, optional_str, required_str};

pub struct WriteFileTool {
    sandbox: Arc<Sandbox>,
    confirm: bool,
}

impl WriteFileTool {
    pub fn new(sandbox: Arc<Sandbox>, confirm: bool) -> Self {
        Self { sandbox, confirm }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Mode 'create' fails if the file exists, 'overwrite' replaces it, 'append' adds to the end."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File to write, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                },
                "mode": {
                    "type": "string",
                    "enum": ["create", "overwrite", "append"],
                    "description": "Write mode (default 'create')",
                    "default": "create"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn confirm_policy(&self) -> ConfirmPolicy {
        if self.confirm {
            ConfirmPolicy::OnDestructive
        } else {
            ConfirmPolicy::Never
        }
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let path = required_str(arguments, "path")?;
        let content = required_str(arguments, "content")?;
        let mode = optional_str(arguments, "mode").unwrap_or("create");

        let resolved = self.sandbox.resolve(path)?;

        match mode {
            "create" => {
                if resolved.exists() {
                    return Err(Error::new(
                        ErrorKind::Unknown,
                        format!("'{path}' already exists; use mode 'overwrite' to replace it"),
                    ));
                }
            }
            "overwrite" | "append" => {}
            other => {
                return Err(Error::new(
                    ErrorKind::Unknown,
                    format!("Invalid mode '{other}'; expected create, overwrite, or append"),
                ));
            }
        }

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&format!("Cannot create parent of '{path}'"), e))?;
        }

        if mode == "append" {
            let mut existing = match tokio::fs::read_to_string(&resolved).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(io_error(&format!("Cannot read '{path}'"), e)),
            };
            existing.push_str(content);
            tokio::fs::write(&resolved, &existing)
                .await
                .map_err(|e| io_error(&format!("Cannot write '{path}'"), e))?;
        } else {
            tokio::fs::write(&resolved, content)
                .await
                .map_err(|e| io_error(&format!("Cannot write '{path}'"), e))?;
        }

        Ok(ToolResult::ok(serde_json::json!({
            "path": path,
            "mode": mode,
            "bytes_written": content.len(),
        })))
    }
}
