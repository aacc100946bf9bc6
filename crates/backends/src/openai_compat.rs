//! OpenAI-compatible backend — the `remote` provider variant.
//!
//! Speaks the `/v1/chat/completions` convention with Bearer auth, which
//! covers OpenAI, vLLM, OpenRouter, Albert, and most hosted gateways.
//! Assistant tool-call arguments are serialized as JSON strings on this
//! wire and parsed back tolerantly (string or map) on the way in.

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

pub struct OpenAiCompatBackend {
    name: String,
    config: BackendConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
    retry_tx: watch::Sender<Option<RetryInfo>>,
    usage: Mutex<UsageTotals>,
}

impl OpenAiCompatBackend {
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

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    fn chat_body(&self, messages: &[Message], tools: &[serde_json::Value], stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": to_api_messages(messages),
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": stream,
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
        let endpoint = format!("{}/v1/chat/completions", self.config.url);

        let response = self
            .auth(self.client.post(&endpoint))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(Error::from_status(status, &error_body));
        }

        let api: ApiResponse = response.json().await.map_err(|e| {
            Error::new(ErrorKind::Unknown, format!("Failed to parse response: {e}"))
        })?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::new(ErrorKind::Unknown, "No choices in response"))?;

        let content = choice.message.content.unwrap_or_default();

        let mut tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: coerce_arguments(tc.function.arguments),
            })
            .collect();

        if tool_calls.is_empty() && !content.is_empty() {
            tool_calls = extract_tool_calls(&content);
            if !tool_calls.is_empty() {
                debug!(count = tool_calls.len(), "Extracted tool calls from response text");
            }
        }
        tool_calls = limit_tool_calls(tool_calls, self.config.max_parallel_tools);

        let finish_reason = finish_reason_for(&tool_calls, choice.finish_reason.as_deref());

        let usage = api.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
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
impl Backend for OpenAiCompatBackend {
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
        let endpoint = format!("{}/v1/chat/completions", self.config.url);
        let body = self.chat_body(messages, &[], true);

        debug!(backend = %self.name, model = %self.config.model, "Sending streaming request");

        let response = self
            .auth(self.client.post(&endpoint))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
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

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(parsed) => {
                            if let Some(choice) = parsed.choices.first() {
                                if let Some(content) = &choice.delta.content {
                                    if !content.is_empty()
                                        && tx.send(Ok(content.clone())).await.is_err()
                                    {
                                        return;
                                    }
                                }
                            }
                        }
                        Err(e) => trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk"),
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let endpoint = format!("{}/v1/models", self.config.url);
        let response = self
            .auth(self.client.get(&endpoint))
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
            .map_err(|e| Error::new(ErrorKind::Unknown, format!("Failed to parse models: {e}")))?;

        Ok(body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> bool {
        let endpoint = format!("{}/health", self.config.url);
        if let Ok(response) = self.client.get(&endpoint).send().await {
            if response.status().is_success() {
                return true;
            }
        }
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

/// Map reqwest transport failures onto the taxonomy: timeouts are
/// retryable `TIMEOUT`, everything else a retryable `SERVER_ERROR`.
fn classify_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::new(ErrorKind::Timeout, format!("Request timed out: {e}"))
    } else {
        Error::new(ErrorKind::ServerError, format!("Connection error: {e}"))
    }
}

/// Convert internal messages to the OpenAI wire shape. Tool-call arguments
/// become JSON strings; tool results carry their `tool_call_id`.
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
            content: Some(m.content.clone()),
            tool_calls: if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: serde_json::Value::String(
                                    serde_json::to_string(&tc.arguments).unwrap_or_default(),
                                ),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

// --- OpenAI wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    /// A JSON string on the wire, but kept as a Value so providers that
    /// return a nested object parse too.
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentichat_core::ProviderKind;

    fn config() -> BackendConfig {
        BackendConfig {
            provider: ProviderKind::Remote,
            url: "https://llm.example.com/".into(),
            model: "mistral-small".into(),
            api_key: Some("sk-test".into()),
            timeout: 30,
            max_tokens: 4096,
            temperature: 0.7,
            context_max_tokens: None,
            max_parallel_tools: None,
        }
    }

    #[test]
    fn trailing_slash_stripped_from_url() {
        let backend = OpenAiCompatBackend::new("remote", config()).unwrap();
        assert_eq!(backend.config().url, "https://llm.example.com");
    }

    #[test]
    fn message_conversion_roles() {
        let messages = vec![Message::system("rules"), Message::user("hi")];
        let api = to_api_messages(&messages);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
    }

    #[test]
    fn tool_call_arguments_serialize_as_json_string() {
        let mut args = serde_json::Map::new();
        args.insert("path".into(), serde_json::json!("a.txt"));
        let msg = Message::assistant_with_calls("", vec![ToolCall::new("read_file", args)]);

        let api = to_api_messages(&[msg]);
        let call = &api[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.r#type, "function");
        let raw = call.function.arguments.as_str().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed["path"], "a.txt");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_9", "{\"success\":true}");
        let api = to_api_messages(&[msg]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_9"));
    }

    #[test]
    fn parse_response_with_structured_tool_call() {
        let data = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "list_files", "arguments": "{\"path\": \".\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
        }"#;
        let api: ApiResponse = serde_json::from_str(data).unwrap();
        let choice = &api.choices[0];
        let tc = &choice.message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.function.name, "list_files");
        let args = coerce_arguments(tc.function.arguments.clone());
        assert_eq!(args["path"], ".");
        assert_eq!(api.usage.unwrap().total_tokens, 30);
    }

    #[test]
    fn parse_response_with_map_arguments() {
        // Some gateways return the arguments as a nested object instead of
        // a JSON string; both must normalize identically.
        let data = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "c",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": {"path": "x.txt"}}
                    }]
                }
            }]
        }"#;
        let api: ApiResponse = serde_json::from_str(data).unwrap();
        let tc = &api.choices[0].message.tool_calls.as_ref().unwrap()[0];
        let args = coerce_arguments(tc.function.arguments.clone());
        assert_eq!(args["path"], "x.txt");
    }

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn usage_accumulates_per_turn() {
        let backend = OpenAiCompatBackend::new("remote", config()).unwrap();
        backend.accumulate_usage(&TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 25,
            total_tokens: 125,
        });
        backend.accumulate_usage(&TokenUsage {
            prompt_tokens: 50,
            completion_tokens: 10,
            total_tokens: 60,
        });

        let totals = backend.usage();
        assert_eq!(totals.prompt_tokens, 150);
        assert_eq!(totals.completion_tokens, 35);
        assert_eq!(totals.api_calls, 2);

        backend.reset_usage();
        assert_eq!(backend.usage(), UsageTotals::default());
    }
}
