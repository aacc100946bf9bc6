//! Ollama backend — the `local` provider variant.
//!
//! Speaks the native `/api/chat` protocol. Unlike the OpenAI wire, tool-call
//! arguments travel as nested maps in both directions, the response is a
//! single JSON object (or JSON lines when streaming), and token counts come
//! from `prompt_eval_count` / `eval_count`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use agentichat_core::{
    Backend, BackendConfig, ChatResponse, Error, ErrorKind, Message, Result, RetryInfo, Role,
    TokenUsage, ToolCall, UsageTotals,
};

use crate::extract::{coerce_arguments, extract_tool_calls};
use crate::retry::{with_retry, RetryPolicy};
use crate::{finish_reason_for, limit_tool_calls};

pub struct OllamaBackend {
    name: String,
    config: BackendConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
    retry_tx: watch::Sender<Option<RetryInfo>>,
    usage: Mutex<UsageTotals>,
}

impl OllamaBackend {
    pub fn new(name: impl Into<String>, mut config: BackendConfig) -> Result<Self> {
        config.url = config.url.trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("HTTP client: {e}")))?;

        let (retry_tx, _) = watch::channel(None);

        Ok(Self {
            name: name.into(),
            config,
            client,
            retry: RetryPolicy::default(),
            retry_tx,
            usage: Mutex::new(UsageTotals::default()),
        })
    }

    /// Override the retry policy (tests use millisecond delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn chat_body(&self, messages: &[Message], tools: &[serde_json::Value], stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": to_api_messages(messages),
            "stream": stream,
            "options": {
                "num_predict": self.config.max_tokens,
                "temperature": self.config.temperature,
            },
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools.to_vec());
        }
        body
    }

    fn accumulate_usage(&self, usage: &TokenUsage) {
        let mut totals = self.usage.lock().unwrap();
        totals.prompt_tokens += usage.prompt_tokens;
        totals.completion_tokens += usage.completion_tokens;
        totals.api_calls += 1;
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<ChatResponse> {
        let endpoint = format!("{}/api/chat", self.config.url);

        let response = self
            .client
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(Error::from_status(status, &error_body));
        }

        let api: OllamaResponse = response.json().await.map_err(|e| {
            Error::new(ErrorKind::Unknown, format!("Failed to parse response: {e}"))
        })?;

        let content = api.message.as_ref().map(|m| m.content.clone()).unwrap_or_default();

        let mut tool_calls: Vec<ToolCall> = api
            .message
            .as_ref()
            .and_then(|m| m.tool_calls.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let id = if tc.id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    tc.id
                };
                ToolCall {
                    id,
                    name: tc.function.name,
                    arguments: coerce_arguments(tc.function.arguments),
                }
            })
            .collect();

        if tool_calls.is_empty() && !content.is_empty() {
            tool_calls = extract_tool_calls(&content);
            if !tool_calls.is_empty() {
                debug!(count = tool_calls.len(), "Extracted tool calls from response text");
            }
        }
        tool_calls = limit_tool_calls(tool_calls, self.config.max_parallel_tools);

        let finish_reason = finish_reason_for(&tool_calls, api.done_reason.as_deref());

        let usage = if api.prompt_eval_count.is_some() || api.eval_count.is_some() {
            let prompt_tokens = api.prompt_eval_count.unwrap_or(0);
            let completion_tokens = api.eval_count.unwrap_or(0);
            Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            })
        } else {
            None
        };
        if let Some(usage) = &usage {
            self.accumulate_usage(usage);
        }

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn chat(&self, messages: &[Message], tools: &[serde_json::Value]) -> Result<ChatResponse> {
        let body = self.chat_body(messages, tools, false);
        debug!(
            backend = %self.name,
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        with_retry(&self.retry, "chat", &self.retry_tx, || self.send_once(&body)).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<mpsc::Receiver<Result<String>>> {
        let endpoint = format!("{}/api/chat", self.config.url);
        let body = self.chat_body(messages, &[], true);

        debug!(backend = %self.name, model = %self.config.model, "Sending streaming request");

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, &error_body));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(Error::new(
                                ErrorKind::ServerError,
                                format!("Stream interrupted: {e}"),
                            )))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // The local wire is JSON lines, one object per chunk.
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<OllamaResponse>(&line) {
                        Ok(parsed) => {
                            if let Some(message) = &parsed.message {
                                if !message.content.is_empty()
                                    && tx.send(Ok(message.content.clone())).await.is_err()
                                {
                                    return;
                                }
                            }
                            if parsed.done {
                                return;
                            }
                        }
                        Err(e) => trace!(line = %line, error = %e, "Ignoring unparseable stream line"),
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let endpoint = format!("{}/api/tags", self.config.url);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, &error_body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("Failed to parse tags: {e}")))?;

        Ok(body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }

    async fn close(&self) {
        debug!(backend = %self.name, "Closing backend HTTP session");
    }

    fn usage(&self) -> UsageTotals {
        *self.usage.lock().unwrap()
    }

    fn reset_usage(&self) {
        *self.usage.lock().unwrap() = UsageTotals::default();
    }

    fn retry_updates(&self) -> watch::Receiver<Option<RetryInfo>> {
        self.retry_tx.subscribe()
    }
}

fn classify_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::new(ErrorKind::Timeout, format!("Request timed out: {e}"))
    } else {
        Error::new(ErrorKind::ServerError, format!("Connection error: {e}"))
    }
}

/// Convert internal messages to the native wire shape. Arguments stay as
/// nested maps on this wire.
fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            }
            .to_string(),
            content: m.content.clone(),
            tool_calls: if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: serde_json::Value::Object(tc.arguments.clone()),
                            },
                        })
                        .collect(),
                )
            },
        })
        .collect()
}

// --- Native wire types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    /// A nested map on this wire, but models sometimes stringify it.
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}
