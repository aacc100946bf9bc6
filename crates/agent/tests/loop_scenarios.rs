//! End-to-end agent loop scenarios with real tools in a temporary
//! workspace and a scripted backend.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use agentichat_agent::{
    AgentLoop, CompressionConfig, CompressionOutcome, ConfirmAnswer, ConfirmationManager,
    ConfirmationPrompt, MemoryManager,
};
use agentichat_core::{
    ArgMap, Backend, BackendConfig, ChatResponse, Conversation, Error, ErrorKind, FinishReason,
    Message, ProviderKind, Result, Role, ToolCall, ToolRegistry,
};
use agentichat_sandbox::Sandbox;
use agentichat_tools::{default_registry, ConfirmToggles};

// ── Test doubles ─────────────────────────────────────────────────────────

struct MockBackend {
    config: BackendConfig,
    script: Mutex<VecDeque<ChatResponse>>,
    calls: AtomicUsize,
    request_sizes: Mutex<Vec<usize>>,
}

impl MockBackend {
    fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Self::with_budget(responses, None)
    }

    fn with_budget(responses: Vec<ChatResponse>, context_max_tokens: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            config: BackendConfig {
                provider: ProviderKind::Local,
                url: "http://localhost:11434".into(),
                model: "mock-model".into(),
                api_key: None,
                timeout: 30,
                max_tokens: 4096,
                temperature: 0.7,
                context_max_tokens,
                max_parallel_tools: None,
            },
            script: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            request_sizes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }
    fn config(&self) -> &BackendConfig {
        &self.config
    }
    async fn chat(&self, messages: &[Message], _tools: &[serde_json::Value]) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.request_sizes.lock().unwrap().push(messages.len());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::new(ErrorKind::Unknown, "mock script exhausted"))
    }
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["mock-model".into()])
    }
    async fn health_check(&self) -> bool {
        true
    }
}

struct ScriptedPrompt {
    answers: Mutex<Vec<ConfirmAnswer>>,
    asks: AtomicUsize,
}

impl ScriptedPrompt {
    fn new(mut answers: Vec<ConfirmAnswer>) -> Self {
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
            asks: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConfirmationPrompt for ScriptedPrompt {
    async fn ask(&self, _tool: &str, _arguments: &ArgMap) -> ConfirmAnswer {
        self.asks.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop()
            .expect("prompt consulted more often than scripted")
    }
    fn show_help(&self) {}
}

/// A prompt that must never be consulted.
struct PanicPrompt;

#[async_trait]
impl ConfirmationPrompt for PanicPrompt {
    async fn ask(&self, tool: &str, _arguments: &ArgMap) -> ConfirmAnswer {
        panic!("unexpected confirmation prompt for '{tool}'");
    }
    fn show_help(&self) {}
}

fn workspace_registry(dir: &Path) -> Arc<ToolRegistry> {
    let sandbox = Arc::new(Sandbox::with_defaults(dir).unwrap());
    Arc::new(default_registry(sandbox, dir, ConfirmToggles::default()))
}

fn reply(text: &str) -> ChatResponse {
    ChatResponse {
        content: text.into(),
        tool_calls: vec![],
        finish_reason: FinishReason::Stop,
        usage: None,
    }
}

fn tool_reply(calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: calls,
        finish_reason: FinishReason::ToolCalls,
        usage: None,
    }
}

fn call(name: &str, args: serde_json::Value) -> ToolCall {
    let arguments = match args {
        serde_json::Value::Object(map) => map,
        _ => ArgMap::new(),
    };
    ToolCall::new(name, arguments)
}

// ── Scenario: deny then retry ────────────────────────────────────────────

#[tokio::test]
async fn denied_write_yields_user_rejected_and_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let registry = workspace_registry(dir.path());

    let write = call(
        "write_file",
        serde_json::json!({"path": "hello.txt", "content": "hi"}),
    );
    let backend = MockBackend::new(vec![
        tool_reply(vec![write]),
        reply("Understood — I will not create the file."),
    ]);

    let agent = AgentLoop::new(backend.clone(), registry, MemoryManager::default());
    let mut confirmations =
        ConfirmationManager::new(Box::new(ScriptedPrompt::new(vec![ConfirmAnswer::No])));

    let mut conv = Conversation::new();
    conv.push(Message::user("Create hello.txt with 'hi'"));

    let answer = agent.run(&mut conv, &mut confirmations).await.unwrap();
    assert!(answer.contains("will not create"));

    // The model was re-invoked after the rejection.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

    // The rejection is a structured tool message.
    let tool_msg = conv.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error"]["kind"], "USER_REJECTED");

    // And nothing touched the disk.
    assert!(!dir.path().join("hello.txt").exists());
}

// ── Scenario: force mode straight through ────────────────────────────────

#[tokio::test]
async fn force_mode_runs_both_writes_without_prompting() {
    let dir = tempfile::tempdir().unwrap();
    let registry = workspace_registry(dir.path());

    let backend = MockBackend::new(vec![
        tool_reply(vec![
            call("write_file", serde_json::json!({"path": "a.txt", "content": "A"})),
            call("write_file", serde_json::json!({"path": "b.txt", "content": "B"})),
        ]),
        reply("Created a.txt and b.txt."),
    ]);

    let agent = AgentLoop::new(backend, registry, MemoryManager::default());
    let mut confirmations = ConfirmationManager::new(Box::new(PanicPrompt));
    confirmations.cycle(); // Ask -> Auto
    confirmations.cycle(); // Auto -> Force

    let mut conv = Conversation::new();
    conv.push(Message::user("Create a.txt with 'A' and b.txt with 'B'"));

    let answer = agent.run(&mut conv, &mut confirmations).await.unwrap();
    assert!(answer.contains("a.txt"));

    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "A");
    assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "B");
}

// ── Scenario: answering All mid-turn flips to AUTO ───────────────────────

#[tokio::test]
async fn all_answer_covers_the_rest_of_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let registry = workspace_registry(dir.path());

    let backend = MockBackend::new(vec![
        tool_reply(vec![
            call("write_file", serde_json::json!({"path": "one.txt", "content": "1"})),
            call("write_file", serde_json::json!({"path": "two.txt", "content": "2"})),
        ]),
        reply("Both written."),
    ]);

    let agent = AgentLoop::new(backend, registry, MemoryManager::default());
    // Only one scripted answer: the second call must not prompt.
    let prompt = ScriptedPrompt::new(vec![ConfirmAnswer::All]);
    let mut confirmations = ConfirmationManager::new(Box::new(prompt));

    let mut conv = Conversation::new();
    conv.push(Message::user("write both files"));
    agent.run(&mut conv, &mut confirmations).await.unwrap();

    assert!(dir.path().join("one.txt").exists());
    assert!(dir.path().join("two.txt").exists());
    assert_eq!(
        confirmations.mode(),
        agentichat_agent::ConfirmationMode::Auto
    );
}

// ── Scenario: XML extraction feeds the loop ──────────────────────────────

#[tokio::test]
async fn xml_extracted_call_lists_the_workspace() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("present.txt"), "x").unwrap();
    let registry = workspace_registry(dir.path());

    // The backend adapter would extract this from free text; replay the
    // extraction output through the loop.
    let content =
        "Plan:\n<tool_call><function=list_files><parameter=path>.</parameter></function></tool_call>";
    let extracted = agentichat_backends::extract_tool_calls(content);
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].name, "list_files");

    let backend = MockBackend::new(vec![
        ChatResponse {
            content: content.into(),
            tool_calls: extracted,
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        },
        reply("The workspace contains present.txt."),
    ]);

    let agent = AgentLoop::new(backend, registry, MemoryManager::default());
    let mut confirmations = ConfirmationManager::new(Box::new(PanicPrompt));

    let mut conv = Conversation::new();
    conv.push(Message::user("what files are here?"));
    let answer = agent.run(&mut conv, &mut confirmations).await.unwrap();
    assert!(answer.contains("present.txt"));

    let tool_msg = conv.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(payload["success"], true);
    assert!(payload["entries"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["name"] == "present.txt"));
}

// ── Scenario: context overflow trims the request, not the log ────────────

#[tokio::test]
async fn overflowing_conversation_sends_a_smaller_request() {
    let mut conv = Conversation::new();
    conv.push(Message::system("You are a helpful assistant."));
    for i in 0..60 {
        let body = format!("message {i} {}", "x".repeat(300));
        if i % 2 == 0 {
            conv.push(Message::user(body));
        } else {
            conv.push(Message::assistant(body));
        }
    }
    conv.push(Message::user("and now?"));
    let canonical_len = conv.messages.len();

    let backend = MockBackend::with_budget(vec![reply("ok")], Some(8_000));
    let agent = AgentLoop::new(
        backend.clone(),
        Arc::new(ToolRegistry::new()),
        MemoryManager::default(),
    );
    let mut confirmations = ConfirmationManager::new(Box::new(PanicPrompt));

    agent.run(&mut conv, &mut confirmations).await.unwrap();

    let sent = backend.request_sizes.lock().unwrap()[0];
    assert!(sent < canonical_len, "request ({sent}) must be smaller than the log ({canonical_len})");
    // The canonical log grew only by the assistant reply.
    assert_eq!(conv.messages.len(), canonical_len + 1);
}

// ── Scenario: auto-compression at the threshold ──────────────────────────

#[tokio::test]
async fn compression_replaces_prefix_with_one_summary() {
    let mut conv = Conversation::new();
    for i in 0..20 {
        if i % 2 == 0 {
            conv.push(Message::user(format!("question {i}")));
        } else {
            conv.push(Message::assistant(format!("answer {i}")));
        }
    }

    let backend = MockBackend::new(vec![reply(
        "The user asked ten questions; the assistant answered each in turn.",
    )]);
    let memory = MemoryManager::new(CompressionConfig {
        auto_enabled: true,
        auto_threshold: 20,
        auto_keep: 5,
        warning_threshold: 0.75,
        max_messages: None,
    });

    assert!(memory.should_auto_compress(conv.messages.len()));

    let outcome = memory
        .compress(backend.as_ref(), &mut conv.messages, Some(5), None)
        .await
        .unwrap();

    assert_eq!(outcome, CompressionOutcome::Compressed { removed: 15, kept: 5 });
    assert_eq!(conv.messages.len(), 6);

    let summary = &conv.messages[0];
    assert_eq!(summary.role, Role::Assistant);
    assert!(summary.content.contains("Summary of the earlier conversation"));
    assert!(summary.content.contains("ten questions"));

    // The preserved tail is the most recent five messages, in order.
    assert_eq!(conv.messages[1].content, "answer 15");
    assert_eq!(conv.messages[5].content, "answer 19");
}

#[tokio::test]
async fn compression_max_bounds_post_length() {
    let mut conv = Conversation::new();
    for i in 0..12 {
        conv.push(Message::user(format!("msg {i}")));
    }

    let backend = MockBackend::new(vec![reply("summary text")]);
    let memory = MemoryManager::default();

    // keep 9 but max 5 → effective keep 4 → 5 messages after.
    memory
        .compress(backend.as_ref(), &mut conv.messages, Some(9), Some(5))
        .await
        .unwrap();
    assert_eq!(conv.messages.len(), 5);
}

#[tokio::test]
async fn compression_skips_tiny_conversations() {
    let mut conv = Conversation::new();
    conv.push(Message::user("only one message"));

    let backend = MockBackend::new(vec![]);
    let memory = MemoryManager::default();

    let outcome = memory
        .compress(backend.as_ref(), &mut conv.messages, None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, CompressionOutcome::Skipped { .. }));
    assert_eq!(conv.messages.len(), 1);
}

// ── Scenario: multi-step tool chain over real files ──────────────────────

#[tokio::test]
async fn read_then_write_chain_completes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("input.txt"), "alpha beta").unwrap();
    let registry = workspace_registry(dir.path());

    let backend = MockBackend::new(vec![
        tool_reply(vec![call("read_file", serde_json::json!({"path": "input.txt"}))]),
        tool_reply(vec![call(
            "write_file",
            serde_json::json!({"path": "output.txt", "content": "ALPHA BETA"}),
        )]),
        reply("Copied input.txt to output.txt in upper case."),
    ]);

    let agent = AgentLoop::new(backend.clone(), registry, MemoryManager::default());
    let mut confirmations =
        ConfirmationManager::new(Box::new(ScriptedPrompt::new(vec![ConfirmAnswer::Yes])));

    let mut conv = Conversation::new();
    conv.push(Message::user("uppercase input.txt into output.txt"));

    let answer = agent.run(&mut conv, &mut confirmations).await.unwrap();
    assert!(answer.contains("output.txt"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("output.txt")).unwrap(),
        "ALPHA BETA"
    );

    // Causal ordering across the whole turn.
    let roles: Vec<Role> = conv.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
        ]
    );
}
