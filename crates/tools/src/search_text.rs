//! Text search tool — walk the workspace and collect matching lines.

use async_trait::async_trait;
use regex::RegexBuilder;
use std::path::Path;
use std::sync::Arc;

use agentichat_core::{ArgMap, Error, ErrorKind, Result, Tool, ToolResult};
use agentichat_sandbox::Sandbox;

use crate::{optional_bool, optional_str, required_str};

/// Result cap so one broad query cannot flood the conversation.
const MAX_MATCHES: usize = 200;

/// Excerpt length per match line.
const EXCERPT_CHARS: usize = 200;

pub struct SearchTextTool {
    sandbox: Arc<Sandbox>,
}

impl SearchTextTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for SearchTextTool {
    fn name(&self) -> &str {
        "search_text"
    }

    fn description(&self) -> &str {
        "Search file contents for a query string or regular expression. Returns matching lines with their path and line number."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text or regex to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search under (default workspace root)"
                },
                "regex": {
                    "type": "boolean",
                    "description": "Treat the query as a regular expression (default false)",
                    "default": false
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Match case exactly (default false)",
                    "default": false
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let query = required_str(arguments, "query")?;
        let path = optional_str(arguments, "path").unwrap_or(".");
        let is_regex = optional_bool(arguments, "regex", false);
        let case_sensitive = optional_bool(arguments, "case_sensitive", false);

        let pattern = if is_regex {
            query.to_string()
        } else {
            regex::escape(query)
        };
        let matcher = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("Invalid regex '{query}': {e}")))?;

        let base = self.sandbox.resolve(path)?;
        if !base.is_dir() {
            return Err(Error::new(
                ErrorKind::FileNotFound,
                format!("'{path}' is not a directory"),
            ));
        }

        let mut matches = Vec::new();
        search_dir(&base, &self.sandbox, &matcher, &mut matches)?;
        let capped = matches.len() > MAX_MATCHES;
        matches.truncate(MAX_MATCHES);

        let mut payload = serde_json::json!({
            "query": query,
            "count": matches.len(),
            "matches": matches,
        });
        if capped {
            payload["capped"] = serde_json::json!(true);
        }

        Ok(ToolResult::ok(payload))
    }
}

fn search_dir(
    dir: &Path,
    sandbox: &Sandbox,
    matcher: &regex::Regex,
    out: &mut Vec<serde_json::Value>,
) -> Result<()> {
    let reader = std::fs::read_dir(dir)
        .map_err(|e| crate::io_error(&format!("Cannot search '{}'", dir.display()), e))?;

    let mut entries: Vec<_> = reader.flatten().map(|e| e.path()).collect();
    entries.sort();

    for path in entries {
        if out.len() > MAX_MATCHES {
            return Ok(());
        }
        if path.is_dir() {
            search_dir(&path, sandbox, matcher, out)?;
            continue;
        }
        if sandbox.check_size(&path).is_err() {
            continue;
        }
        // Binary and non-UTF-8 files are skipped.
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };

        let relative = path
            .strip_prefix(sandbox.root())
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        for (idx, line) in text.lines().enumerate() {
            if matcher.is_match(line) {
                let excerpt: String = line.trim().chars().take(EXCERPT_CHARS).collect();
                out.push(serde_json::json!({
                    "path": relative,
                    "line": idx + 1,
                    "excerpt": excerpt,
                }));
                if out.len() > MAX_MATCHES {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{args, workspace};
    use std::fs;

    #[tokio::test]
    async fn finds_literal_matches_with_line_numbers() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "alpha\nneedle here\nomega\n").unwrap();
        fs::write(dir.path().join("b.txt"), "no match\n").unwrap();

        let tool = SearchTextTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"query": "needle"})))
            .await
            .unwrap();

        assert_eq!(result.payload["count"], 1);
        let m = &result.payload["matches"][0];
        assert_eq!(m["path"], "a.txt");
        assert_eq!(m["line"], 2);
        assert!(m["excerpt"].as_str().unwrap().contains("needle"));
    }

    #[tokio::test]
    async fn case_insensitive_by_default() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "NEEDLE\n").unwrap();

        let tool = SearchTextTool::new(sandbox.clone());
        let result = tool
            .execute(&args(serde_json::json!({"query": "needle"})))
            .await
            .unwrap();
        assert_eq!(result.payload["count"], 1);

        let strict = SearchTextTool::new(sandbox);
        let result = strict
            .execute(&args(serde_json::json!({"query": "needle", "case_sensitive": true})))
            .await
            .unwrap();
        assert_eq!(result.payload["count"], 0);
    }

    #[tokio::test]
    async fn regex_mode() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("code.rs"), "fn main() {}\nfn helper() {}\n").unwrap();

        let tool = SearchTextTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"query": r"fn \w+\(\)", "regex": true})))
            .await
            .unwrap();
        assert_eq!(result.payload["count"], 2);
    }

    #[tokio::test]
    async fn literal_mode_escapes_metacharacters() {
        let (dir, sandbox) = workspace();
        fs::write(dir.path().join("a.txt"), "price is $5.00\nprice is 5x00\n").unwrap();

        let tool = SearchTextTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"query": "$5.00"})))
            .await
            .unwrap();
        assert_eq!(result.payload["count"], 1);
    }

    #[tokio::test]
    async fn searches_subdirectories() {
        let (dir, sandbox) = workspace();
        fs::create_dir_all(dir.path().join("src/deep")).unwrap();
        fs::write(dir.path().join("src/deep/x.rs"), "target line\n").unwrap();

        let tool = SearchTextTool::new(sandbox);
        let result = tool
            .execute(&args(serde_json::json!({"query": "target"})))
            .await
            .unwrap();
        assert_eq!(result.payload["count"], 1);
    }

    #[tokio::test]
    async fn invalid_regex_rejected() {
        let (_dir, sandbox) = workspace();
        let tool = SearchTextTool::new(sandbox);
        let err = tool
            .execute(&args(serde_json::json!({"query": "([", "regex": true})))
            .await
            .unwrap_err();
        assert!(err.message.contains("Invalid regex"));
    }
}
