//! List files tool — directory listing with optional recursion and pattern.

use async_trait::async_trait;
use glob::Pattern;
use std::path::Path;
use std::sync::Arc;

use agentichat_core::{ArgMap, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{optional_bool, optional_str, required_str};

pub struct ListFilesTool {
    sandbox: Arc<Sandbox>,
}

impl ListFilesTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories at the given path. Supports recursive listing and a glob pattern filter on entry names. Noise directories (.venv, node_modules, .git, ...) are skipped unless include_ignored is set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the workspace"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Descend into subdirectories (default false)",
                    "default": false
                },
                "pattern": {
                    "type": "string",
                    "description": "Optional glob filter on entry names, e.g. '*.rs'"
                },
                "include_ignored": {
                    "type": "boolean",
                    "description": "Also list normally ignored directories (.venv, node_modules, .git, ...). Default false.",
                    "default": false
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let path = required_str(arguments, "path")?;
        let recursive = optional_bool(arguments, "recursive", false);
        let include_ignored = optional_bool(arguments, "include_ignored", false);
        let pattern = match optional_str(arguments, "pattern") {
            Some(p) => Some(Pattern::new(p).map_err(|e| {
                Error::new(ErrorKind::Unknown, format!("Invalid pattern '{p}': {e}"))
            })?),
            None => None,
        };

        let dir = self.sandbox.resolve(path)?;
        if !dir.is_dir() {
            return Err(Error::new(
                ErrorKind::FileNotFound,
                format!("'{path}' is not a directory"),
            ));
        }

        let mut walk = Walk {
            sandbox: &self.sandbox,
            recursive,
            include_ignored,
            pattern,
            entries: Vec::new(),
            ignored: 0,
        };
        walk.collect(&dir)?;

        let Walk { mut entries, ignored, .. } = walk;
        entries.sort_by(|a, b| a["path"].as_str().cmp(&b["path"].as_str()));

        let mut payload = serde_json::json!({
            "path": path,
            "count": entries.len(),
            "entries": entries,
        });
        if ignored > 0 {
            payload["ignored_count"] = serde_json::json!(ignored);
            payload["note"] = serde_json::json!(format!(
                "{ignored} entries skipped (.venv, node_modules, etc.); pass include_ignored=true to list them"
            ));
        }

        Ok(ToolResult::ok(payload))
    }
}

struct Walk<'a> {
    sandbox: &'a Sandbox,
    recursive: bool,
    include_ignored: bool,
    pattern: Option<Pattern>,
    entries: Vec<serde_json::Value>,
    ignored: u64,
}

impl Walk<'_> {
    fn collect(&mut self, dir: &Path) -> Result<()> {
        let reader = std::fs::read_dir(dir)
            .map_err(|e| crate::io_error(&format!("Cannot list '{}'", dir.display()), e))?;

        for entry in reader.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = path.is_dir();

            if !self.include_ignored && self.sandbox.should_ignore(&path) {
                self.ignored += 1;
                continue;
            }

            let relative = path
                .strip_prefix(self.sandbox.root())
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();

            if self.pattern.as_ref().map(|p| p.matches(&name)).unwrap_or(true) {
                let size = if is_dir {
                    serde_json::Value::Null
                } else {
                    path.metadata()
                        .map(|m| serde_json::json!(m.len()))
                        .unwrap_or(serde_json::Value::Null)
                };
                self.entries.push(serde_json::json!({
                    "name": name,
                    "path": relative,
                    "kind": if is_dir { "dir" } else { "file" },
                    "size": size,
                }));
            }

            if self.recursive && is_dir {
                self.collect(&path)?;
            }
        }
        Ok(())
    }
}
