//! Confirmation gate - the "ask a human yes/no" capability.
//!
//! Destructive resolutions must never run on guessed consent. The gate is
//! a capability interface with two implementations: an interactive one
//! that prompts on the terminal, and an unattended one for CI that
//! refuses without blocking. Which one a caller constructs is decided by
//! explicit configuration, not by runtime branching inside the
//! controller.

use tracing::debug;

/// Outcome of a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The operator confirmed.
    Yes,
    /// The operator declined.
    No,
    /// The prompt was aborted (interrupt, closed stdin, or no human
    /// available).
    Aborted,
}

/// Asks a human a yes/no question.
#[async_trait::async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Whether a human is available to answer prompts.
    fn attended(&self) -> bool;

    /// Ask a yes/no question. Must not block when unattended.
    async fn ask(&self, prompt: &str) -> Decision;
}

/// Gate for unattended execution (CI, no controlling terminal).
///
/// Always answers [`Decision::Aborted`] without blocking; the controller
/// fails closed instead of defaulting destructive actions to "yes".
#[derive(Debug, Default)]
pub struct UnattendedGate;

#[async_trait::async_trait]
impl ConfirmationGate for UnattendedGate {
    fn attended(&self) -> bool {
        false
    }

    async fn ask(&self, prompt: &str) -> Decision {
        debug!(prompt, "unattended execution, refusing confirmation");
        Decision::Aborted
    }
}

/// Interactive gate reading `y`/`n` from standard input.
#[derive(Debug, Default)]
pub struct StdinGate;

impl StdinGate {
    /// Create an interactive gate.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ConfirmationGate for StdinGate {
    fn attended(&self) -> bool {
        true
    }

    async fn ask(&self, prompt: &str) -> Decision {
        use std::io::Write;
        use tokio::io::AsyncBufReadExt;

        print!("{} [y/N] ", prompt);
        if std::io::stdout().flush().is_err() {
            return Decision::Aborted;
        }

        let mut line = String::new();
        let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            // EOF: stdin closed under the prompt.
            Ok(0) | Err(_) => Decision::Aborted,
            Ok(_) => parse_answer(&line),
        }
    }
}

/// Interpret a typed answer.
fn parse_answer(line: &str) -> Decision {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => Decision::Yes,
        _ => Decision::No,
    }
}

/// Whether the process environment signals unattended execution.
///
/// This is the one place that inspects the environment; callers pass the
/// result into their options explicitly so the controller stays
/// deterministic given its inputs.
pub fn unattended_from_env() -> bool {
    std::env::var_os("CI").is_some() || std::env::var_os("GITHUB_ACTIONS").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), Decision::Yes);
        assert_eq!(parse_answer("YES\n"), Decision::Yes);
        assert_eq!(parse_answer("n\n"), Decision::No);
        assert_eq!(parse_answer("\n"), Decision::No);
        assert_eq!(parse_answer("whatever\n"), Decision::No);
    }

    #[tokio::test]
    async fn test_unattended_gate_aborts_without_blocking() {
        let gate = UnattendedGate;
        assert!(!gate.attended());
        assert_eq!(gate.ask("destroy everything?").await, Decision::Aborted);
    }
}
