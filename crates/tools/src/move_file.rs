//! Move/rename tool.

use async_trait::async_trait;
use std::sync::Arc;

use agentichat_core::{ArgMap, ConfirmPolicy, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{io_error, optional_bool, required_str};

pub struct MoveFileTool {
    sandbox: Arc<Sandbox>,
    confirm: bool,
}

impl MoveFileTool {
    pub fn new(sandbox: Arc<Sandbox>, confirm: bool) -> Self {
        Self { sandbox, confirm }
    }
}

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file or directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "src": {
                    "type": "string",
                    "description": "Existing path, relative to the workspace"
                },
                "dst": {
                    "type": "string",
                    "description": "New path, relative to the workspace"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Replace the destination if it exists (default false)",
                    "default": false
                }
            },
            "required": ["src", "dst"]
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
        let src = required_str(arguments, "src")?;
        let dst = required_str(arguments, "dst")?;
        let overwrite = optional_bool(arguments, "overwrite", false);

        let from = self.sandbox.resolve(src)?;
        let to = self.sandbox.resolve(dst)?;

        if !from.exists() {
            return Err(Error::new(ErrorKind::FileNotFound, format!("'{src}' does not exist")));
        }
        if to.exists() {
            if !overwrite {
                return Err(Error::new(
                    ErrorKind::Unknown,
                    format!("'{dst}' already exists; pass overwrite=true to replace it"),
                ));
            }
            let removal = if to.is_dir() {
                tokio::fs::remove_dir_all(&to).await
            } else {
                tokio::fs::remove_file(&to).await
            };
            removal.map_err(|e| io_error(&format!("Cannot replace '{dst}'"), e))?;
        }

        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&format!("Cannot create parent of '{dst}'"), e))?;
        }

        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| io_error(&format!("Cannot move '{src}'"), e))?;

        Ok(ToolResult::ok(serde_json::json!({
            "src": src,
            "dst": dst,
            "moved": true,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{args, workspace};
    use std::fs;

    #[tokio::test]
    async fn renames_file() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("old.txt"), "content").unwrap();

        let tool = MoveFileTool::new(sandbox, true);
        let result = tool
            .execute(&args(serde_json::json!({
                "src": "old.txt",
                "dst": "new.txt"
            })))
            .await
            .unwrap();

        assert!(result.success);
        assert!(!dir.path().join("old.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("new.txt")).unwrap(), "content");
    }

    #[tokio::test]
    async fn moves_into_new_directory() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("file.txt"), "x").unwrap();

        let tool = MoveFileTool::new(sandbox, true);
        tool.execute(&args(serde_json::json!({
            "src": "file.txt",
            "dst": "archive/2024/file.txt"
        })))
        .await
        .unwrap();

        assert!(dir.path().join("archive/2024/file.txt").exists());
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let (_dir, sandbox) = workspace();
        let tool = MoveFileTool::new(sandbox, true);
        let err = tool
            .execute(&args(serde_json::json!({
                "src": "ghost.txt",
                "dst": "x.txt"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileNotFound);
    }

    #[tokio::test]
    async fn existing_destination_fails_without_overwrite() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        let tool = MoveFileTool::new(sandbox, true);
        let err = tool
            .execute(&args(serde_json::json!({
                "src": "a.txt",
                "dst": "b.txt"
            })))
            .await
            .unwrap_err();
        assert!(err.message.contains("overwrite=true"));
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "b");
    }

    #[tokio::test]
    async fn overwrite_replaces_destination() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        let tool = MoveFileTool::new(sandbox, true);
        let result = tool
            .execute(&args(serde_json::json!({
                "src": "a.txt",
                "dst": "b.txt",
                "overwrite": true
            })))
            .await
            .unwrap();

        assert!(result.success);
        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "a");
    }

    #[tokio::test]
    async fn overwrite_replaces_directory_destination() {
        let (dir, sandbox) = workspace();
        fs::create_dir(dir.path().join("src-dir")).unwrap();
        fs::write(dir.path().join("src-dir/f.txt"), "new").unwrap();
        fs::create_dir(dir.path().join("dst-dir")).unwrap();
        fs::write(dir.path().join("dst-dir/old.txt"), "old").unwrap();

        let tool = MoveFileTool::new(sandbox, true);
        tool.execute(&args(serde_json::json!({
            "src": "src-dir",
            "dst": "dst-dir",
            "overwrite": true
        })))
        .await
        .unwrap();

        assert!(!dir.path().join("src-dir").exists());
        assert!(dir.path().join("dst-dir/f.txt").exists());
        assert!(!dir.path().join("dst-dir/old.txt").exists());
    }

    #[tokio::test]
    async fn destination_outside_workspace_rejected() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let tool = MoveFileTool::new(sandbox, true);
        let err = tool
            .execute(&args(serde_json::json!({
                "src": "a.txt",
                "dst": "../stolen.txt"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathOutsideSandbox);
    }
}
