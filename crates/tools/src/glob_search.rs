//! Glob search tool — find files by pattern relative to the workspace.

use async_trait::async_trait;
use glob::Pattern;
use std::sync::Arc;

use agentichat_core::{ArgMap, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{optional_bool, optional_str, required_str};

/// Cap on returned paths.
const MAX_RESULTS: usize = 500;

pub struct GlobSearchTool {
    sandbox: Arc<Sandbox>,
}

impl GlobSearchTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for GlobSearchTool {
    fn name(&self) -> &str {
        "glob_search"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern, e.g. '*.py', '**/*.js', 'src/**/*.tsx'. Noise directories (.venv, node_modules, .git, ...) are excluded unless include_ignored is set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, relative to the workspace"
                },
                "exclude": {
                    "type": "string",
                    "description": "Additional glob to exclude, e.g. '**/tests/**'. Noise directories are already excluded by default."
                },
                "include_ignored": {
                    "type": "boolean",
                    "description": "Also match inside normally ignored directories (.venv, node_modules, .git, ...). Default false.",
                    "default": false
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let pattern = required_str(arguments, "pattern")?;
        let include_ignored = optional_bool(arguments, "include_ignored", false);
        let exclude = match optional_str(arguments, "exclude") {
            Some(e) => Some(Pattern::new(e).map_err(|err| {
                Error::new(ErrorKind::Unknown, format!("Invalid exclude pattern '{e}': {err}"))
            })?),
            None => None,
        };

        let full_pattern = format!("{}/{}", self.sandbox.root().display(), pattern);
        let paths = glob::glob(&full_pattern).map_err(|e| {
            Error::new(ErrorKind::Unknown, format!("Invalid glob pattern '{pattern}': {e}"))
        })?;

        let mut ignored = 0u64;
        let mut matches: Vec<String> = Vec::new();
        for path in paths.flatten() {
            if !path.is_file() {
                continue;
            }
            if !include_ignored && self.sandbox.should_ignore(&path) {
                ignored += 1;
                continue;
            }
            let Ok(relative) = path.strip_prefix(self.sandbox.root()) else {
                continue;
            };
            if let Some(exclude) = &exclude {
                if exclude.matches_path(relative) || exclude.matches_path(&path) {
                    continue;
                }
            }
            // Re-validate through the sandbox so blocked files never leak
            // into results.
            let relative = relative.to_string_lossy().into_owned();
            if self.sandbox.resolve(&relative).is_ok() {
                matches.push(relative);
            }
        }
        matches.sort();
        let capped = matches.len() > MAX_RESULTS;
        matches.truncate(MAX_RESULTS);

        let mut payload = serde_json::json!({
            "pattern": pattern,
            "count": matches.len(),
            "matches": matches,
        });
        if capped {
            payload["capped"] = serde_json::json!(true);
        }
        if ignored > 0 {
            payload["ignored_count"] = serde_json::json!(ignored);
            payload["note"] = serde_json::json!(format!(
                "{ignored} files skipped (.venv, node_modules, etc.); pass include_ignored=true to match them"
            ));
        }

        Ok(ToolResult::ok(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{args, workspace};
    use std::fs;

    #[tokio::test]
    async fn matches_by_extension() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("main.rs"), "x").unwrap();
        fs::write(dir.path().join("notes.md"), "x").unwrap();

        let tool = GlobSearchTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"pattern": "*.rs"})))
            .await
            .unwrap();

        assert_eq!(result.payload["count"], 1);
        assert_eq!(result.payload["matches"][0], "main.rs");
    }

    #[tokio::test]
    async fn double_star_recurses() {
        let (dir, sandbox) = workspace();
        fs::create_dir_all(dir.path().join("src/deep")).unwrap();
        fs::write(dir.path().join("src/deep/mod.rs"), "x").unwrap();
        fs::write(dir.path().join("top.rs"), "x").unwrap();

        let tool = GlobSearchTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"pattern": "**/*.rs"})))
            .await
            .unwrap();

        let matches = result.payload["matches"].as_array().unwrap();
        assert!(matches.iter().any(|m| m == "src/deep/mod.rs"));
        assert!(matches.iter().any(|m| m == "top.rs"));
    }

    #[tokio::test]
    async fn noise_directories_excluded_by_default() {
        let (dir, sandbox) = workspace();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join("app.js"), "x").unwrap();

        let tool = GlobSearchTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"pattern": "**/*.js"})))
            .await
            .unwrap();

        assert_eq!(result.payload["count"], 1);
        assert_eq!(result.payload["matches"][0], "app.js");
        assert_eq!(result.payload["ignored_count"], 1);
        assert!(result.payload["note"]
            .as_str()
            .unwrap()
            .contains("include_ignored"));
    }

    #[tokio::test]
    async fn include_ignored_matches_noise_directories() {
        let (dir, sandbox) = workspace();
        fs::create_dir_all(dir.path().join(".venv/lib")).unwrap();
        fs::write(dir.path().join(".venv/lib/site.py"), "x").unwrap();

        let tool = GlobSearchTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({
                "pattern": "**/*.py",
                "include_ignored": true
            })))
            .await
            .unwrap();

        assert_eq!(result.payload["count"], 1);
        assert_eq!(result.payload["matches"][0], ".venv/lib/site.py");
        assert!(result.payload.get("ignored_count").is_none());
    }

    #[tokio::test]
    async fn exclude_pattern_filters_matches() {
        let (dir, sandbox) = workspace();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "x").unwrap();
        fs::write(dir.path().join("tests/it.rs"), "x").unwrap();

        let tool = GlobSearchTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({
                "pattern": "**/*.rs",
                "exclude": "tests/**"
            })))
            .await
            .unwrap();

        assert_eq!(result.payload["count"], 1);
        assert_eq!(result.payload["matches"][0], "src/lib.rs");
    }

    #[tokio::test]
    async fn invalid_exclude_rejected() {
        let (_dir, sandbox) = workspace();
        let tool = GlobSearchTool::new(sandbox);
        let err = tool
            .execute(&args(serde_json::json!({"pattern": "*.rs", "exclude": "["})))
            .await
            .unwrap_err();
        assert!(err.message.contains("Invalid exclude pattern"));
    }

    #[tokio::test]
    async fn blocked_files_never_leak() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("server.key"), "secret").unwrap();
        fs::write(dir.path().join("server.txt"), "fine").unwrap();

        let tool = GlobSearchTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"pattern": "server.*"})))
            .await
            .unwrap();

        assert_eq!(result.payload["count"], 1);
        assert_eq!(result.payload["matches"][0], "server.txt");
    }

    #[tokio::test]
    async fn no_matches_is_success() {
        let (_dir, sandbox) = workspace();
        let tool = GlobSearchTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"pattern": "*.nothing"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.payload["count"], 0);
    }
}
