//! Copy tool — duplicate a file or a whole directory tree.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentichat_core::{ArgMap, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{io_error, optional_bool, required_str};

pub struct CopyFileTool {
    sandbox: Arc<Sandbox>,
}

impl CopyFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CopyFileTool {
    fn name(&self) -> &str {
        "copy_file"
    }

    fn description(&self) -> &str {
        "Copy a file or directory to a new path. Directories are copied recursively."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "src": {
                    "type": "string",
                    "description": "Existing file or directory, relative to the workspace"
                },
                "dst": {
                    "type": "string",
                    "description": "Target path, relative to the workspace"
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

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let src = required_str(arguments, "src")?;
        let dst = required_str(arguments, "dst")?;
        let overwrite = optional_bool(arguments, "overwrite", false);

        let from = self.sandbox.resolve(src)?;
        let to = self.sandbox.resolve(dst)?;

        if !from.exists() {
            return Err(Error::new(ErrorKind::FileNotFound, format!("'{src}' does not exist")));
        }
        if to.starts_with(&from) && from.is_dir() {
            return Err(Error::new(
                ErrorKind::Unknown,
                format!("cannot copy '{src}' into itself"),
            ));
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

        let (files, bytes) = if from.is_dir() {
            copy_tree(&from, &to)
                .await
                .map_err(|e| io_error(&format!("Cannot copy '{src}'"), e))?
        } else {
            let bytes = tokio::fs::copy(&from, &to)
                .await
                .map_err(|e| io_error(&format!("Cannot copy '{src}'"), e))?;
            (1, bytes)
        };

        Ok(ToolResult::ok(serde_json::json!({
            "src": src,
            "dst": dst,
            "files_copied": files,
            "bytes_copied": bytes,
        })))
    }
}

/// Recursive directory copy, iterative to keep the future small. Returns
/// (files copied, bytes copied).
async fn copy_tree(from: &Path, to: &Path) -> std::io::Result<(u64, u64)> {
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];
    let mut files = 0u64;
    let mut bytes = 0u64;

    while let Some((src_dir, dst_dir)) = pending.pop() {
        tokio::fs::create_dir_all(&dst_dir).await?;
        let mut reader = tokio::fs::read_dir(&src_dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            let target = dst_dir.join(entry.file_name());
            if path.is_dir() {
                pending.push((path, target));
            } else {
                bytes += tokio::fs::copy(&path, &target).await?;
                files += 1;
            }
        }
    }
    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{args, workspace};
    use std::fs;

    #[tokio::test]
    async fn copies_file() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("src.txt"), "payload").unwrap();

        let tool = CopyFileTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({
                "src": "src.txt",
                "dst": "dst.txt"
            })))
            .await
            .unwrap();

        assert_eq!(result.payload["files_copied"], 1);
        assert_eq!(result.payload["bytes_copied"], 7);
        assert_eq!(fs::read_to_string(dir.path().join("src.txt")).unwrap(), "payload");
        assert_eq!(fs::read_to_string(dir.path().join("dst.txt")).unwrap(), "payload");
    }

    #[tokio::test]
    async fn copies_directory_recursively() {
        let (dir, sandbox) = workspace();
        fs::create_dir_all(dir.path().join("proj/sub")).unwrap();
        fs::write(dir.path().join("proj/a.txt"), "aa").unwrap();
        fs::write(dir.path().join("proj/sub/b.txt"), "bbb").unwrap();

        let tool = CopyFileTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({
                "src": "proj",
                "dst": "backup"
            })))
            .await
            .unwrap();

        assert_eq!(result.payload["files_copied"], 2);
        assert_eq!(result.payload["bytes_copied"], 5);
        assert_eq!(fs::read_to_string(dir.path().join("backup/a.txt")).unwrap(), "aa");
        assert_eq!(fs::read_to_string(dir.path().join("backup/sub/b.txt")).unwrap(), "bbb");
        // The source tree is untouched.
        assert!(dir.path().join("proj/sub/b.txt").exists());
    }

    #[tokio::test]
    async fn refuses_copy_into_itself() {
        let (dir, sandbox) = workspace();
        fs::create_dir(dir.path().join("proj")).unwrap();

        let tool = CopyFileTool::new(sandbox);
        let err = tool
            .execute(&args(serde_json::json!({
                "src": "proj",
                "dst": "proj/clone"
            })))
            .await
            .unwrap_err();
        assert!(err.message.contains("into itself"));
    }

    #[tokio::test]
    async fn existing_destination_fails_without_overwrite() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        let tool = CopyFileTool::new(sandbox);
        let err = tool
            .execute(&args(serde_json::json!({
                "src": "a.txt",
                "dst": "b.txt"
            })))
            .await
            .unwrap_err();
        assert!(err.message.contains("overwrite=true"));
    }

    #[tokio::test]
    async fn overwrite_replaces_destination() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "new").unwrap();
        fs::write(dir.path().join("b.txt"), "old").unwrap();

        let tool = CopyFileTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({
                "src": "a.txt",
                "dst": "b.txt",
                "overwrite": true
            })))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn overwrite_replaces_directory_destination() {
        let (dir, sandbox) = workspace();
        fs::create_dir(dir.path().join("proj")).unwrap();
        fs::write(dir.path().join("proj/f.txt"), "fresh").unwrap();
        fs::create_dir(dir.path().join("backup")).unwrap();
        fs::write(dir.path().join("backup/stale.txt"), "stale").unwrap();

        let tool = CopyFileTool::new(sandbox);
        tool.execute(&args(serde_json::json!({
            "src": "proj",
            "dst": "backup",
            "overwrite": true
        })))
        .await
        .unwrap();

        assert!(dir.path().join("backup/f.txt").exists());
        assert!(!dir.path().join("backup/stale.txt").exists());
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let (_dir, sandbox) = workspace();
        let tool = CopyFileTool::new(sandbox);
        let err = tool
            .execute(&args(serde_json::json!({
                "src": "ghost.txt",
                "dst": "copy.txt"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileNotFound);
    }
}
