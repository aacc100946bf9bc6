//! Create directory tool.

use async_trait::async_trait;
use std::sync::Arc;

use agentichat_core::{ArgMap, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{io_error, required_str};

pub struct CreateDirectoryTool {
    sandbox: Arc<Sandbox>,
}

impl CreateDirectoryTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a directory, including any missing parents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to create, relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let path = required_str(arguments, "path")?;
        let resolved = self.sandbox.resolve(path)?;

        tokio::fs::create_dir_all(&resolved)
            .await
            .map_err(|e| io_error(&format!("Cannot create '{path}'"), e))?;

        Ok(ToolResult::ok(serde_json::json!({
            "path": path,
            "created": true,
        })))
    }
}
