//! Shell execution tool — run a command under the workspace with a timeout.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use agentichat_core::{
    ArgMap, ConfirmPolicy, Error, ErrorKind, Result, Tool, ToolFailure, ToolResult,
};
use agentichat_sandbox::Sandbox;

use crate::{optional_str, optional_u64, required_str};

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct ShellExecTool {
    sandbox: Arc<Sandbox>,
    confirm: bool,
}

impl ShellExecTool {
    pub fn new(sandbox: Arc<Sandbox>, confirm: bool) -> Self {
        Self { sandbox, confirm }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout, stderr, and the exit code. Use for running programs, git operations, builds, etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory, relative to the workspace (default workspace root)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 30)",
                    "default": 30
                }
            },
            "required": ["command"]
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
        let command = required_str(arguments, "command")?;
        let timeout_secs = optional_u64(arguments, "timeout").unwrap_or(DEFAULT_TIMEOUT_SECS);

        let cwd = match optional_str(arguments, "cwd") {
            Some(dir) => {
                let resolved = self.sandbox.resolve(dir)?;
                if !resolved.is_dir() {
                    return Err(Error::new(
                        ErrorKind::FileNotFound,
                        format!("cwd '{dir}' is not a directory"),
                    ));
                }
                resolved
            }
            None => self.sandbox.root().to_path_buf(),
        };

        debug!(command = %command, cwd = %cwd.display(), "Executing shell command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .output();

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            child,
        )
        .await
        {
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out");
                return Err(Error::new(
                    ErrorKind::Timeout,
                    format!("Command timed out after {timeout_secs}s"),
                ));
            }
            Ok(Err(e)) => {
                return Err(Error::new(
                    ErrorKind::CommandFailed,
                    format!("Failed to spawn command: {e}"),
                ));
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        if !success {
            warn!(command = %command, exit_code, "Command exited non-zero");
        }

        let mut payload = agentichat_core::ArgMap::new();
        payload.insert("command".into(), serde_json::json!(command));
        payload.insert("stdout".into(), serde_json::json!(stdout));
        payload.insert("stderr".into(), serde_json::json!(stderr));
        payload.insert("exit_code".into(), serde_json::json!(exit_code));

        Ok(ToolResult {
            success,
            payload,
            error: if success {
                None
            } else {
                Some(ToolFailure {
                    kind: ErrorKind::CommandFailed,
                    message: format!("Command exited with code {exit_code}"),
                })
            },
            truncated: false,
        })
    }
}
