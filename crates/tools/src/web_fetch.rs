//! Web fetch tool — retrieve a URL and return its text content, bounded.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use agentichat_core::{ArgMap, Error, ErrorKind, Result, Tool, ToolResult};

use crate::{optional_u64, required_str};

/// Cap on returned text.
const MAX_CONTENT_CHARS: usize = 10_000;

/// Default fetch timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its text content with HTML tags stripped. The body is bounded to 10000 characters."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Full URL to fetch (must start with http:// or https://)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 10)",
                    "default": 10
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let url = required_str(arguments, "url")?;
        let timeout_secs = optional_u64(arguments, "timeout").unwrap_or(DEFAULT_TIMEOUT_SECS);

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::new(
                ErrorKind::Unknown,
                "URL must start with http:// or https://",
            ));
        }

        let response = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::new(ErrorKind::Timeout, format!("Fetch timed out: {e}"))
                } else {
                    Error::new(ErrorKind::Unknown, format!("Connection error: {e}"))
                }
            })?;

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        if status_code != 200 {
            return Ok(ToolResult::fail(
                ErrorKind::Unknown,
                format!("HTTP {status_code} fetching '{url}'"),
            ));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("Failed to read body: {e}")))?;
        let content_length = raw.len();

        let mut text = strip_html(&raw);
        if text.chars().count() > MAX_CONTENT_CHARS {
            text = text.chars().take(MAX_CONTENT_CHARS).collect();
            text.push_str("... [content truncated]");
        }

        Ok(ToolResult::ok(serde_json::json!({
            "url": url,
            "status_code": status_code,
            "content": text,
            "content_type": content_type,
            "content_length": content_length,
        })))
    }
}

/// Drop tags and collapse whitespace so the model sees readable text.
fn strip_html(html: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let without_tags = tags.replace_all(html, " ");
    space.replace_all(&without_tags, " ").trim().to_string()
}
