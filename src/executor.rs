//! Shell-out to the cluster CLI.
//!
//! Commands are split on whitespace only, so an argument containing spaces
//! cannot be expressed. This matches what the agent's tool contract promises
//! and is intentionally not upgraded to shell-style quoting.

use crate::error::{Error, Result};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Runs `kubectl` (or another configured binary) with model-supplied arguments.
#[derive(Debug, Clone)]
pub struct KubectlExecutor {
    binary: String,
}

impl Default for KubectlExecutor {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Final argument vector for `command`, binary name first.
    ///
    /// An empty command yields `[binary, ""]`: the CLI is invoked with one
    /// empty argument rather than no arguments. Whitespace-only input is
    /// treated the same way.
    pub fn argv(&self, command: &str) -> Vec<String> {
        let mut tokens: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            return vec![self.binary.clone(), String::new()];
        }
        if tokens[0] != self.binary {
            tokens.insert(0, self.binary.clone());
        }
        tokens
    }

    /// Run `command` and return the raw stdout bytes.
    ///
    /// A non-zero exit is returned as [`Error::Command`] with the captured
    /// output; it is not retried here.
    pub async fn run(&self, command: &str) -> Result<Vec<u8>> {
        let argv = self.argv(command);
        execute(&argv).await
    }
}

/// Run an arbitrary whitespace-split command with no binary prefixing.
pub async fn run_shell(command: &str) -> Result<Vec<u8>> {
    let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(Error::command("<empty>", None, "empty command"));
    }
    execute(&argv).await
}

async fn execute(argv: &[String]) -> Result<Vec<u8>> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::command("<empty>", None, "empty command"))?;
    debug!(program = %program, args = ?args, "executing command");

    let output = Command::new(program).args(args).output().await?;
    check_status(program, output)
}

fn check_status(program: &str, output: Output) -> Result<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }

    let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !captured.is_empty() && !captured.ends_with('\n') {
            captured.push('\n');
        }
        captured.push_str(stderr.trim_end());
    }

    debug!(program, code = ?output.status.code(), "command failed");
    Err(Error::command(program, output.status.code(), captured))
}
