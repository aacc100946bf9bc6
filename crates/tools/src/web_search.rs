//! Web search tool — DuckDuckGo instant-answer queries.

use async_trait::async_trait;
use serde::Deserialize;

use agentichat_core::{ArgMap, Error, ErrorKind, Result, Tool, ToolResult};

use crate::{optional_u64, required_str};

const SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";
const DEFAULT_MAX_RESULTS: u64 = 5;

pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return an ordered list of results with title, URL, and snippet. Uses DuckDuckGo."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum results to return (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: &ArgMap) -> Result<ToolResult> {
        let query = required_str(arguments, "query")?;
        let max_results = optional_u64(arguments, "max_results").unwrap_or(DEFAULT_MAX_RESULTS) as usize;

        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::new(ErrorKind::Timeout, format!("Search timed out: {e}"))
                } else {
                    Error::new(ErrorKind::Unknown, format!("Connection error: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(ToolResult::fail(
                ErrorKind::Unknown,
                format!("HTTP {status} from search endpoint"),
            ));
        }

        let body: InstantAnswer = response
            .json()
            .await
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("Failed to parse search response: {e}")))?;

        let results = collect_results(&body, max_results);

        Ok(ToolResult::ok(serde_json::json!({
            "query": query,
            "count": results.len(),
            "results": results,
        })))
    }
}

/// Flatten the instant-answer payload into ordered (title, url, snippet)
/// entries: the abstract first, then related topics.
fn collect_results(answer: &InstantAnswer, max_results: usize) -> Vec<serde_json::Value> {
    let mut results = Vec::new();

    if !answer.abstract_text.is_empty() {
        results.push(serde_json::json!({
            "title": answer.heading.clone(),
            "url": answer.abstract_url.clone(),
            "snippet": answer.abstract_text.clone(),
        }));
    }

    for topic in &answer.related_topics {
        if results.len() >= max_results {
            break;
        }
        let (Some(text), Some(url)) = (&topic.text, &topic.first_url) else {
            continue;
        };
        let title = text.split(" - ").next().unwrap_or(text).to_string();
        results.push(serde_json::json!({
            "title": title,
            "url": url,
            "snippet": text,
        }));
    }

    results.truncate(max_results);
    results
}

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text", default)]
    text: Option<String>,
    #[serde(rename = "FirstURL", default)]
    first_url: Option<String>,
}
