//! Delete file tool.

use async_trait::async_trait;
use std::sync::Arc;

use agentichat_core::{ArgMap, ConfirmPolicy, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{io_error, required_str};

pub struct DeleteFileTool {
    sandbox: Arc<Sandbox>,
    confirm: bool,
}

impl DeleteFileTool {
    pub fn new(sandbox: Arc<Sandbox>, confirm: bool) -> Self {
        Self { sandbox, confirm }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a single file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File to delete, relative to the workspace"
                }
            },
            "required": ["path"]
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
        let resolved = self.sandbox.resolve(path)?;

        if !resolved.exists() {
            return Err(Error::new(ErrorKind::FileNotFound, format!("'{path}' does not exist")));
        }
        if resolved.is_dir() {
            return Err(Error::new(
                ErrorKind::Unknown,
                format!("'{path}' is a directory; use delete_directory"),
            ));
        }

        tokio::fs::remove_file(&resolved)
            .await
            .map_err(|e| io_error(&format!("Cannot delete '{path}'"), e))?;

        Ok(ToolResult::ok(serde_json::json!({
            "path": path,
            "deleted": true,
        })))
    }
}
