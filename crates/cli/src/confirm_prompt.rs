//! Interactive confirmation prompt over stdin.
//!
//! Renders the pending tool invocation (content preview for file writes,
//! the command for shell, the target for deletions) and reads a single
//! Y/A/N/? answer. Runs only while the agent loop owns the terminal; the
//! line editor is idle during a turn, so nothing here races it.

use async_trait::async_trait;

use agentichat_agent::{ConfirmAnswer, ConfirmationPrompt};
use agentichat_core::ArgMap;

/// Longest content preview shown for file writes.
const PREVIEW_CHARS: usize = 200;

pub struct StdinPrompt;

#[async_trait]
impl ConfirmationPrompt for StdinPrompt {
    async fn ask(&self, tool: &str, arguments: &ArgMap) -> ConfirmAnswer {
        println!();
        println!("=== Confirmation required ===");
        render_request(tool, arguments);
        println!("[Y] yes   [A] yes to all   [N] no   [?] help");

        loop {
            let line = read_line().await;
            match line.trim().to_lowercase().as_str() {
                "" | "y" | "yes" => {
                    println!("  -> approved");
                    return ConfirmAnswer::Yes;
                }
                "a" | "all" => {
                    println!("  -> approved for the rest of the session (AUTO mode)");
                    return ConfirmAnswer::All;
                }
                "n" | "no" => {
                    println!("  -> rejected");
                    return ConfirmAnswer::No;
                }
                "?" => return ConfirmAnswer::Help,
                other => {
                    println!("Invalid answer '{other}'. Type Y, A, N, or ? for help.");
                }
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("Confirmation answers:");
        println!("  Y / yes / Enter  accept this operation");
        println!("  A / all          accept this and every following operation (AUTO mode)");
        println!("  N / no           reject; the model is told the user declined");
        println!("  ?                show this help");
        println!();
        println!("[Y] yes   [A] yes to all   [N] no   [?] help");
    }
}

fn render_request(tool: &str, arguments: &ArgMap) {
    let str_arg = |key: &str| arguments.get(key).and_then(|v| v.as_str()).unwrap_or("?");

    match tool {
        "write_file" => {
            println!("Write file: {}", str_arg("path"));
            if let Some(content) = arguments.get("content").and_then(|v| v.as_str()) {
                let preview: String = content.chars().take(PREVIEW_CHARS).collect();
                let suffix = if content.chars().count() > PREVIEW_CHARS { "..." } else { "" };
                println!("--- content preview ---");
                println!("{preview}{suffix}");
                println!("-----------------------");
            }
        }
        "delete_file" => println!("Delete file: {}", str_arg("path")),
        "delete_directory" => println!("Delete directory: {}", str_arg("path")),
        "move_file" => {
            println!("Move: {} -> {}", str_arg("src"), str_arg("dst"));
        }
        "shell_exec" => {
            println!("Run command: $ {}", str_arg("command"));
            if let Some(cwd) = arguments.get("cwd").and_then(|v| v.as_str()) {
                println!("  in directory: {cwd}");
            }
        }
        _ => {
            println!("Tool: {tool}");
            if let Ok(rendered) = serde_json::to_string_pretty(arguments) {
                println!("{rendered}");
            }
        }
    }
}

/// Read one line from stdin without blocking the runtime. EOF rejects.
async fn read_line() -> String {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => "n".to_string(),
            Ok(_) => line,
        }
    })
    .await
    .unwrap_or_else(|_| "n".to_string())
}
