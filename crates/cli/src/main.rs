//! agentichat — an interactive terminal assistant with an agentic tool loop.
//!
//! Exit codes: 0 normal, 1 fatal configuration error, 2 unrecoverable
//! backend failure at startup. Runtime errors during a turn never exit
//! the process.

use clap::Parser;
use std::path::PathBuf;

mod app;
mod confirm_prompt;

#[derive(Parser)]
#[command(
    name = "agentichat",
    about = "Chat with an LLM that can act on your workspace through tools",
    version
)]
struct Cli {
    /// Send a single message and exit instead of entering the REPL
    #[arg(short, long)]
    message: Option<String>,

    /// Backend entry to use (overrides default_backend from the config)
    #[arg(long)]
    backend: Option<String>,

    /// Workspace directory the sandbox is rooted at (default: current directory)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = app::run(cli.message, cli.backend, cli.workspace).await;
    std::process::exit(code);
}
