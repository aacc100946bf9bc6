//! Confirmation manager — the three-mode policy guarding sensitive tools.
//!
//! Modes: ASK (prompt for every sensitive call), AUTO (accept silently,
//! entered by answering "all" to a prompt), FORCE (always accept). The
//! interactive prompt is behind a trait so the manager itself stays free of
//! terminal concerns and fully testable.

use async_trait::async_trait;
use tracing::debug;

use agentichat_core::ArgMap;

/// Current confirmation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMode {
    Ask,
    Auto,
    Force,
}

impl ConfirmationMode {
    /// Short label for the status line.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ask => "Ask",
            Self::Auto => "Auto",
            Self::Force => "Force",
        }
    }
}

/// A single-key answer from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAnswer {
    /// `Y` — accept this operation.
    Yes,
    /// `A` — accept this operation and everything after it (switch to AUTO).
    All,
    /// `N` — reject this operation.
    No,
    /// `?` — show help and ask again.
    Help,
}

/// The interactive surface the manager prompts through.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    /// Present the tool and its arguments, read one answer.
    async fn ask(&self, tool: &str, arguments: &ArgMap) -> ConfirmAnswer;

    /// Show the help text for the answer keys.
    fn show_help(&self);
}

/// Tracks the confirmation mode and runs prompts when the mode requires it.
pub struct ConfirmationManager {
    mode: ConfirmationMode,
    prompt: Box<dyn ConfirmationPrompt>,
}

impl ConfirmationManager {
    /// Start in ASK mode with the given prompt surface.
    pub fn new(prompt: Box<dyn ConfirmationPrompt>) -> Self {
        Self {
            mode: ConfirmationMode::Ask,
            prompt,
        }
    }

    pub fn mode(&self) -> ConfirmationMode {
        self.mode
    }

    /// Whether `confirm` would prompt right now.
    pub fn would_prompt(&self) -> bool {
        self.mode == ConfirmationMode::Ask
    }

    /// Ask the user to approve a tool invocation. In AUTO or FORCE this
    /// returns `true` without any I/O. In ASK the prompt loops on `?` until
    /// a decisive answer arrives; answering `A` flips the mode to AUTO.
    pub async fn confirm(&mut self, tool: &str, arguments: &ArgMap) -> bool {
        if matches!(self.mode, ConfirmationMode::Auto | ConfirmationMode::Force) {
            return true;
        }

        loop {
            match self.prompt.ask(tool, arguments).await {
                ConfirmAnswer::Yes => return true,
                ConfirmAnswer::All => {
                    debug!("Confirmation mode switched to AUTO by 'all' answer");
                    self.mode = ConfirmationMode::Auto;
                    return true;
                }
                ConfirmAnswer::No => return false,
                ConfirmAnswer::Help => self.prompt.show_help(),
            }
        }
    }

    /// Advance ASK → AUTO → FORCE → ASK. Bound to a keybinding at idle.
    pub fn cycle(&mut self) {
        self.mode = match self.mode {
            ConfirmationMode::Ask => ConfirmationMode::Auto,
            ConfirmationMode::Auto => ConfirmationMode::Force,
            ConfirmationMode::Force => ConfirmationMode::Ask,
        };
    }

    /// Back to ASK. Invoked on session reset.
    pub fn reset(&mut self) {
        self.mode = ConfirmationMode::Ask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Prompt that replays a scripted sequence of answers and counts calls.
    pub struct ScriptedPrompt {
        answers: Mutex<Vec<ConfirmAnswer>>,
        pub asks: AtomicUsize,
        pub helps: AtomicUsize,
    }

    impl ScriptedPrompt {
        pub fn new(mut answers: Vec<ConfirmAnswer>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                asks: AtomicUsize::new(0),
                helps: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ConfirmationPrompt for ScriptedPrompt {
        async fn ask(&self, _tool: &str, _arguments: &ArgMap) -> ConfirmAnswer {
            self.asks.fetch_add(1, Ordering::SeqCst);
            self.answers.lock().unwrap().pop().unwrap_or(ConfirmAnswer::No)
        }

        fn show_help(&self) {
            self.helps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(answers: Vec<ConfirmAnswer>) -> ConfirmationManager {
        ConfirmationManager::new(Box::new(ScriptedPrompt::new(answers)))
    }

    #[test]
    fn starts_in_ask_mode() {
        let m = manager(vec![]);
        assert_eq!(m.mode(), ConfirmationMode::Ask);
        assert!(m.would_prompt());
    }

    #[tokio::test]
    async fn yes_approves_without_mode_change() {
        let mut m = manager(vec![ConfirmAnswer::Yes]);
        assert!(m.confirm("write_file", &ArgMap::new()).await);
        assert_eq!(m.mode(), ConfirmationMode::Ask);
    }

    #[tokio::test]
    async fn no_rejects() {
        let mut m = manager(vec![ConfirmAnswer::No]);
        assert!(!m.confirm("delete_file", &ArgMap::new()).await);
        assert_eq!(m.mode(), ConfirmationMode::Ask);
    }

    #[tokio::test]
    async fn all_approves_and_enters_auto() {
        let mut m = manager(vec![ConfirmAnswer::All]);
        assert!(m.confirm("shell_exec", &ArgMap::new()).await);
        assert_eq!(m.mode(), ConfirmationMode::Auto);
        // Subsequent calls need no prompt at all.
        assert!(m.confirm("shell_exec", &ArgMap::new()).await);
    }

    #[tokio::test]
    async fn help_loops_until_decisive_answer() {
        let prompt = ScriptedPrompt::new(vec![
            ConfirmAnswer::Help,
            ConfirmAnswer::Help,
            ConfirmAnswer::Yes,
        ]);
        let mut m = ConfirmationManager::new(Box::new(prompt));
        assert!(m.confirm("write_file", &ArgMap::new()).await);
    }

    #[tokio::test]
    async fn auto_and_force_confirm_without_io() {
        for target in [ConfirmationMode::Auto, ConfirmationMode::Force] {
            // An empty script answers No if consulted, so passing
            // confirms proves the prompt was never touched.
            let mut m = manager(vec![]);
            m.mode = target;
            for _ in 0..3 {
                assert!(m.confirm("shell_exec", &ArgMap::new()).await);
            }
        }
    }

    #[test]
    fn cycle_is_a_permutation_of_order_three() {
        let mut m = manager(vec![]);
        assert_eq!(m.mode(), ConfirmationMode::Ask);
        m.cycle();
        assert_eq!(m.mode(), ConfirmationMode::Auto);
        m.cycle();
        assert_eq!(m.mode(), ConfirmationMode::Force);
        m.cycle();
        assert_eq!(m.mode(), ConfirmationMode::Ask);
    }

    #[test]
    fn reset_returns_to_ask() {
        let mut m = manager(vec![]);
        m.cycle();
        m.cycle();
        assert_eq!(m.mode(), ConfirmationMode::Force);
        m.reset();
        assert_eq!(m.mode(), ConfirmationMode::Ask);
    }

    #[test]
    fn mode_labels() {
        assert_eq!(ConfirmationMode::Ask.label(), "Ask");
        assert_eq!(ConfirmationMode::Auto.label(), "Auto");
        assert_eq!(ConfirmationMode::Force.label(), "Force");
    }
}
