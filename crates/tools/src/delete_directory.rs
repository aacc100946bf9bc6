//! Delete directory tool.

use async_trait::async_trait;
use std::sync::Arc;

use agentichat_core::{ArgMap, ConfirmPolicy, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{io_error, optional_bool, required_str};

pub struct DeleteDirectoryTool {
    sandbox: Arc<Sandbox>,
    confirm: bool,
}

impl DeleteDirectoryTool {
    pub fn new(sandbox: Arc<Sandbox>, confirm: bool) -> Self {
        Self { sandbox, confirm }
    }
}

#[async_trait]
impl Tool for DeleteDirectoryTool {
    fn name(&self) -> &str {
        "delete_directory"
    }

    fn description(&self) -> &str {
        "Delete a directory. Non-recursive deletion fails when the directory is not empty."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to delete, relative to the workspace"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Delete contents as well (default false)",
                    "default": false
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
        let recursive = optional_bool(arguments, "recursive", false);

        let resolved = self.sandbox.resolve(path)?;
        if !resolved.exists() {
            return Err(Error::new(ErrorKind::FileNotFound, format!("'{path}' does not exist")));
        }
        if !resolved.is_dir() {
            return Err(Error::new(
                ErrorKind::Unknown,
                format!("'{path}' is not a directory; use delete_file"),
            ));
        }
        if resolved == self.sandbox.root() {
            return Err(Error::new(
                ErrorKind::PermissionDenied,
                "Refusing to delete the workspace root",
            ));
        }

        let outcome = if recursive {
            tokio::fs::remove_dir_all(&resolved).await
        } else {
            tokio::fs::remove_dir(&resolved).await
        };
        outcome.map_err(|e| io_error(&format!("Cannot delete '{path}'"), e))?;

        Ok(ToolResult::ok(serde_json::json!({
            "path": path,
            "deleted": true,
            "recursive": recursive,
        })))
    }
}
