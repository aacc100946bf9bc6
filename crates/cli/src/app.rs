//! The interactive host: REPL, slash commands, turn execution.
//!
//! Lines starting with `/` are commands; everything else becomes a user
//! message handed to the agent loop. Runtime errors are rendered per kind
//! and never exit the process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::watch;
use tracing::{debug, error, info};

use agentichat_agent::{AgentLoop, CompressionConfig, CompressionOutcome, ConfirmationManager, MemoryManager};
use agentichat_backends::build_backend;
use agentichat_config::{Config, ModelMetadataStore};
use agentichat_core::{Backend, Conversation, Error, ErrorKind, Message, RetryInfo, ToolRegistry};
use agentichat_sandbox::Sandbox;
use agentichat_tools::{default_registry, ConfirmToggles};

use crate::confirm_prompt::StdinPrompt;

/// Entry point from `main`; returns the process exit code.
pub async fn run(message: Option<String>, backend_name: Option<String>, workspace: Option<PathBuf>) -> i32 {
    let mut app = match App::bootstrap(backend_name, workspace).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    let code = match message {
        Some(text) => app.run_single(&text).await,
        None => app.run_repl().await,
    };

    app.backend.close().await;
    code
}

struct App {
    config: Config,
    backend: Arc<dyn Backend>,
    registry: Arc<ToolRegistry>,
    agent: AgentLoop,
    confirmations: ConfirmationManager,
    conversation: Conversation,
    metadata: ModelMetadataStore,
}

impl App {
    async fn bootstrap(backend_name: Option<String>, workspace: Option<PathBuf>) -> Result<Self, i32> {
        let config = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {e}");
                return Err(1);
            }
        };

        if config.backends.is_empty() {
            eprintln!("No backends configured.");
            eprintln!();
            eprintln!("Create ~/.agentichat/config.yaml, for example:");
            eprintln!();
            eprintln!("{}", Config::example_yaml());
            return Err(1);
        }

        let workspace = workspace.unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        });
        let sandbox = match Sandbox::new(
            &workspace,
            &config.sandbox.blocked_paths,
            config.sandbox.max_file_size,
        ) {
            Ok(sandbox) => Arc::new(sandbox),
            Err(e) => {
                eprintln!("Workspace error: {e}");
                return Err(1);
            }
        };

        let data_dir = config.data_dir();
        let metadata = ModelMetadataStore::load(&data_dir);

        let (entry_name, mut backend_config) = match config.backend_entry(backend_name.as_deref()) {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("Configuration error: {e}");
                return Err(1);
            }
        };
        // A constraint learned in a previous session applies proactively
        // unless the config pins its own limit.
        if backend_config.max_parallel_tools.is_none() {
            backend_config.max_parallel_tools = metadata.max_parallel_tools(&backend_config.model);
        }

        let backend = match build_backend(&entry_name, backend_config) {
            Ok(backend) => backend,
            Err(e) => {
                eprintln!("Backend error: {e}");
                return Err(2);
            }
        };
        if !backend.health_check().await {
            eprintln!(
                "Backend '{entry_name}' is unreachable at {}.",
                backend.config().url
            );
            eprintln!("Check the server and your configuration, then try again.");
            return Err(2);
        }
        info!(backend = entry_name, model = backend.model(), "Backend ready");

        let registry = Arc::new(default_registry(
            sandbox,
            &data_dir,
            ConfirmToggles {
                text_operations: config.confirmations.text_operations,
                shell_commands: config.confirmations.shell_commands,
            },
        ));

        let agent = build_agent(&config, backend.clone(), registry.clone());
        let confirmations = ConfirmationManager::new(Box::new(StdinPrompt));
        let mut conversation = Conversation::new();
        conversation.model = Some(backend.model().to_string());

        Ok(Self {
            config,
            backend,
            registry,
            agent,
            confirmations,
            conversation,
            metadata,
        })
    }

    // ── Modes ────────────────────────────────────────────────────────────

    async fn run_single(&mut self, text: &str) -> i32 {
        self.run_turn(text).await;
        0
    }

    async fn run_repl(&mut self) -> i32 {
        println!();
        println!("agentichat — {} via '{}'", self.conversation.model.as_deref().unwrap_or("?"), self.backend.name());
        println!("Type a message, or /help for commands. Ctrl-C cancels a running turn, Ctrl-D quits.");
        println!();

        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("Cannot initialize the line editor: {e}");
                return 1;
            }
        };

        loop {
            let handle = tokio::task::spawn_blocking(move || {
                let result = editor.readline("agentichat> ");
                (editor, result)
            });
            let (returned, result) = match handle.await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Line editor task failed");
                    return 1;
                }
            };
            editor = returned;

            match result {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(&line);

                    if let Some(command) = line.strip_prefix('/') {
                        if !self.handle_command(command).await {
                            break;
                        }
                    } else {
                        self.run_turn(&line).await;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("(Ctrl-C — type /quit or press Ctrl-D to exit)");
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("Input error: {e}");
                    break;
                }
            }
        }

        println!("Goodbye.");
        0
    }

    // ── Turn execution ───────────────────────────────────────────────────

    async fn run_turn(&mut self, text: &str) {
        self.backend.reset_usage();
        self.conversation.push(Message::user(text));
        // Rollback point for cancellation: everything up to and including
        // the user message survives, partial turn output does not.
        let baseline = self.conversation.messages.clone();

        let spinner = spawn_spinner(self.backend.retry_updates());
        let start = Instant::now();

        let outcome = tokio::select! {
            result = self.agent.run(&mut self.conversation, &mut self.confirmations) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        spinner.abort();
        eprint!("\r{:70}\r", "");

        let elapsed = start.elapsed().as_secs_f64();
        let usage = self.backend.usage();
        self.conversation
            .record_usage(usage.prompt_tokens, usage.completion_tokens, usage.api_calls);

        match outcome {
            None => {
                self.conversation.messages = baseline;
                println!();
                println!("Cancelled. The model was stopped; you can continue with a new message.");
                info!("Turn cancelled by Ctrl-C");
            }
            Some(Ok(reply)) => {
                println!();
                println!("{}", "-".repeat(40));
                println!("{reply}");
                if usage.total_tokens() > 0 {
                    let calls = if usage.api_calls > 1 {
                        format!(" | {} API calls", usage.api_calls)
                    } else {
                        String::new()
                    };
                    println!();
                    println!(
                        "({elapsed:.1}s | {} tokens: {} prompt + {} completion{calls})",
                        usage.total_tokens(),
                        usage.prompt_tokens,
                        usage.completion_tokens
                    );
                }
            }
            Some(Err(err)) => self.render_error(&err),
        }

        self.after_turn().await;
    }

    /// Warning line and auto-compression, per the memory policy.
    async fn after_turn(&mut self) {
        let count = self.conversation.messages.len();

        if let Some(warning) = self.agent.memory().check_usage(count) {
            println!();
            match warning.over_percent {
                Some(0) => println!(
                    "Note: {}/{} messages (threshold reached)",
                    warning.count, warning.threshold
                ),
                Some(over) => println!(
                    "Note: {}/{} messages (threshold exceeded by {over}%)",
                    warning.count, warning.threshold
                ),
                None => println!(
                    "Note: {}/{} messages ({}% of the compression threshold)",
                    warning.count, warning.threshold, warning.percent
                ),
            }
            println!("Use /compress to shrink the history, or /help compress for details.");
        }

        if self.agent.memory().should_auto_compress(count) {
            println!();
            println!("Message limit reached, compressing automatically...");
            let keep = self.agent.memory().compression().auto_keep;
            self.compress(Some(keep), None).await;
        }
    }

    fn render_error(&mut self, err: &Error) {
        println!();
        match err.kind {
            ErrorKind::RateLimit => {
                println!("Rate limited by the provider (retries exhausted).");
                println!("Wait a minute, or use /clear to shrink the history.");
            }
            ErrorKind::ContextTooLong => {
                println!("The conversation no longer fits the model's context window.");
                println!("Use /compress to summarize the history, or /clear to start over.");
                println!("Setting context_max_tokens in the config enables automatic trimming.");
            }
            ErrorKind::AuthError => {
                println!("Authentication failed: {}", err.message);
                println!("Check the api_key for this backend in ~/.agentichat/config.yaml.");
            }
            ErrorKind::ModelNotFound => {
                println!("Model not found: {}", err.message);
                println!("Use /backend list to see configured entries.");
            }
            ErrorKind::MaxIterations => {
                println!("The task hit the iteration limit ({}).", self.config.max_iterations);
                println!("Split the request into smaller steps, or raise max_iterations in the config.");
            }
            _ => {
                let model = self.backend.model().to_string();
                if self.metadata.detect_and_save_constraint(&model, &err.message) {
                    println!("Provider constraint detected: {}", err.message);
                    println!("Saved for '{model}'; please retry your request.");
                } else {
                    println!("Error: {err}");
                    error!(error = %err, "Turn failed");
                }
            }
        }
        println!("You can continue with a new message.");
    }

    // ── Slash commands ───────────────────────────────────────────────────

    /// Returns false when the REPL should exit.
    async fn handle_command(&mut self, command: &str) -> bool {
        let mut parts = command.split_whitespace();
        let verb = parts.next().unwrap_or("");
        let rest: Vec<&str> = parts.collect();

        match verb {
            "quit" | "exit" => return false,
            "help" => self.print_help(rest.first().copied()),
            "clear" => {
                self.conversation.reset();
                self.conversation.model = Some(self.backend.model().to_string());
                self.confirmations.reset();
                println!("Conversation cleared, confirmation mode back to Ask.");
            }
            "compress" => match parse_compress_args(&rest) {
                Ok((keep, max)) => self.compress(keep, max).await,
                Err(message) => {
                    println!("{message}");
                    println!("Usage: /compress [--keep N] [--max N]");
                }
            },
            "config" => self.print_config(),
            "prompt" => match self.agent.system_prompt() {
                Some(prompt) => println!("{prompt}"),
                None => println!("No system prompt (no tools registered)."),
            },
            "tools" => {
                println!("Available tools ({}):", self.registry.len());
                for (name, description) in self.registry.catalogue() {
                    println!("  {name:<18} {description}");
                }
            }
            "mode" => {
                self.confirmations.cycle();
                println!("Confirmation mode: {}", self.confirmations.mode().label());
            }
            "backend" => self.handle_backend_command(&rest).await,
            other => {
                println!("Unknown command '/{other}'. Type /help for the command list.");
            }
        }
        true
    }

    async fn handle_backend_command(&mut self, args: &[&str]) {
        match args {
            [] | ["list"] => {
                let mut names: Vec<&String> = self.config.backends.keys().collect();
                names.sort();
                println!("Configured backends:");
                for name in names {
                    let entry = &self.config.backends[name];
                    let active = if name == self.backend.name() { " (active)" } else { "" };
                    println!("  {name:<12} {} @ {}{active}", entry.model, entry.url);
                }
            }
            ["use", name] => {
                let (entry_name, mut backend_config) = match self.config.backend_entry(Some(*name)) {
                    Ok(entry) => entry,
                    Err(e) => {
                        println!("{e}");
                        return;
                    }
                };
                if backend_config.max_parallel_tools.is_none() {
                    backend_config.max_parallel_tools =
                        self.metadata.max_parallel_tools(&backend_config.model);
                }
                let backend = match build_backend(&entry_name, backend_config) {
                    Ok(backend) => backend,
                    Err(e) => {
                        println!("Cannot build backend '{entry_name}': {e}");
                        return;
                    }
                };
                if !backend.health_check().await {
                    println!(
                        "Warning: backend '{entry_name}' did not answer its health check; switching anyway."
                    );
                }
                self.backend.close().await;
                self.backend = backend;
                self.agent = build_agent(&self.config, self.backend.clone(), self.registry.clone());
                self.conversation.model = Some(self.backend.model().to_string());
                println!("Switched to backend '{entry_name}' ({}).", self.backend.model());
            }
            _ => println!("Usage: /backend [list | use <name>]"),
        }
    }

    async fn compress(&mut self, keep: Option<usize>, max: Option<usize>) {
        debug!(?keep, ?max, "Compression requested");
        let before = self.conversation.messages.len();
        let outcome = self
            .agent
            .memory()
            .compress(
                self.backend.as_ref(),
                &mut self.conversation.messages,
                keep,
                max,
            )
            .await;

        match outcome {
            Ok(CompressionOutcome::Compressed { removed, kept }) => {
                println!(
                    "Compressed {removed} messages into one summary; {} messages now ({} kept).",
                    self.conversation.messages.len(),
                    kept
                );
                debug!(before, after = self.conversation.messages.len(), "Compression done");
            }
            Ok(CompressionOutcome::Skipped { reason }) => println!("Compression skipped: {reason}"),
            Err(err) => println!("Compression failed: {err}"),
        }
    }

    fn print_config(&self) {
        let backend_config = self.backend.config();
        println!("Active backend: {} ({})", self.backend.name(), backend_config.model);
        println!("  url: {}", backend_config.url);
        println!("  timeout: {}s, max_tokens: {}", backend_config.timeout, backend_config.max_tokens);
        match backend_config.context_max_tokens {
            Some(budget) => println!("  context budget: {budget} tokens (trimming on)"),
            None => println!("  context budget: unset (trimming off)"),
        }
        if let Some(limit) = backend_config.max_parallel_tools {
            println!("  max parallel tools: {limit}");
        }
        println!("Confirmation mode: {}", self.confirmations.mode().label());
        println!(
            "Sandbox: max file size {} bytes, {} blocked patterns",
            self.config.sandbox.max_file_size,
            self.config.sandbox.blocked_paths.len()
        );
        let compression = self.agent.memory().compression();
        println!(
            "Compression: auto {}, threshold {}, keep {}, warn at {:.0}%",
            if compression.auto_enabled { "on" } else { "off" },
            compression.auto_threshold,
            compression.auto_keep,
            compression.warning_threshold * 100.0
        );
        println!("Max iterations per turn: {}", self.config.max_iterations);
        println!(
            "Session: {} messages, {} tokens used",
            self.conversation.messages.len(),
            self.conversation.usage.total_tokens()
        );
    }

    fn print_help(&self, topic: Option<&str>) {
        match topic {
            Some("compress") => {
                println!("/compress            summarize the whole conversation");
                println!("/compress --keep N   keep the last N messages, summarize the rest");
                println!("/compress --max N    bound the post-compression length to N messages");
                println!();
                println!("Automatic compression is controlled by the compression section of the");
                println!("config (auto_enabled, auto_threshold, auto_keep, max_messages).");
            }
            _ => {
                println!("Commands:");
                println!("  /help [topic]   this help (topics: compress)");
                println!("  /clear          wipe the conversation and reset confirmations");
                println!("  /compress       summarize old history into one message");
                println!("  /config         show the active configuration");
                println!("  /prompt         show the session system prompt");
                println!("  /tools          list available tools");
                println!("  /mode           cycle the confirmation mode (Ask/Auto/Force)");
                println!("  /backend        list backends, or /backend use <name>");
                println!("  /quit           exit");
            }
        }
    }
}

fn build_agent(config: &Config, backend: Arc<dyn Backend>, registry: Arc<ToolRegistry>) -> AgentLoop {
    let memory = MemoryManager::new(CompressionConfig {
        auto_enabled: config.compression.auto_enabled,
        auto_threshold: config.compression.auto_threshold,
        auto_keep: config.compression.auto_keep,
        warning_threshold: config.compression.warning_threshold,
        max_messages: config.compression.max_messages,
    });
    AgentLoop::new(backend, registry, memory).with_max_iterations(config.max_iterations)
}

/// Background progress indicator: elapsed seconds, plus the retry countdown
/// whenever the backend is backing off. Aborted by the caller as soon as
/// the request settles.
fn spawn_spinner(retry_rx: watch::Receiver<Option<RetryInfo>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let elapsed = start.elapsed().as_secs_f64();
            let status = match *retry_rx.borrow() {
                Some(RetryInfo {
                    attempt,
                    max_attempts,
                    delay_secs,
                }) => format!(
                    "retrying (attempt {attempt}/{max_attempts}, waiting {delay_secs}s)... {elapsed:.0}s"
                ),
                None => format!("thinking... {elapsed:.0}s"),
            };
            eprint!("\r  {status:<60}");
        }
    })
}

fn parse_compress_args(args: &[&str]) -> Result<(Option<usize>, Option<usize>), String> {
    let mut keep = None;
    let mut max = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match *arg {
            "--keep" => {
                keep = Some(parse_count(iter.next(), "--keep")?);
            }
            "--max" | "-m" => {
                max = Some(parse_count(iter.next(), arg)?);
            }
            other => return Err(format!("Unknown option '{other}'")),
        }
    }
    Ok((keep, max))
}

fn parse_count(value: Option<&&str>, flag: &str) -> Result<usize, String> {
    let raw = value.ok_or_else(|| format!("{flag} requires a value"))?;
    let parsed: usize = raw
        .parse()
        .map_err(|_| format!("{flag} requires an integer, got '{raw}'"))?;
    if parsed < 1 {
        return Err(format!("{flag} must be >= 1"));
    }
    Ok(parsed)
}
