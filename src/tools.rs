//! Tools the agent can call against the cluster.
//!
//! [`LocalTools`] shells out through [`KubectlExecutor`]; the MCP client in
//! [`crate::mcp`] implements the same [`ToolBackend`] seam over stdio.

use crate::executor::{self, KubectlExecutor};
use crate::llm::ToolDef;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

/// Max bytes of tool output handed back to the model.
const MAX_RESULT_BYTES: usize = 8000;

/// Tagged result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Text sent to the model as the tool message.
    pub fn into_message(self) -> String {
        match self {
            Self::Success(text) if text.trim().is_empty() => "(no output)".into(),
            Self::Success(text) => truncate(text),
            Self::Failure(reason) => truncate(format!("error: {reason}")),
        }
    }
}

#[async_trait]
pub trait ToolBackend: Send + Sync {
    fn definitions(&self) -> Vec<ToolDef>;

    async fn call(&self, name: &str, arguments: &Value) -> ToolOutcome;
}

pub const KUBECTL_TOOL: &str = "call_kubectl";
pub const SHELL_TOOL: &str = "call_shell";

/// Executor-backed tools run on the local machine.
pub struct LocalTools {
    kubectl: KubectlExecutor,
    allow_shell: bool,
}

impl LocalTools {
    pub fn new(kubectl: KubectlExecutor, allow_shell: bool) -> Self {
        Self {
            kubectl,
            allow_shell,
        }
    }
}

fn command_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "description": description
            }
        },
        "required": ["command"]
    })
}

#[async_trait]
impl ToolBackend for LocalTools {
    fn definitions(&self) -> Vec<ToolDef> {
        let mut defs = vec![ToolDef {
            name: KUBECTL_TOOL.into(),
            description: "Call any kubectl command in the current cluster context. Returns the \
                          command's standard output. Pass one command per call; arguments are \
                          split on whitespace and quoting is not supported."
                .into(),
            input_schema: command_schema(
                "kubectl command, with or without the leading 'kubectl' (e.g. 'get pods -A')",
            ),
        }];
        if self.allow_shell {
            defs.push(ToolDef {
                name: SHELL_TOOL.into(),
                description: "Call a generic shell command on the operator's machine. Arguments \
                              are split on whitespace; pipes and redirection are not available."
                    .into(),
                input_schema: command_schema("command line to run"),
            });
        }
        defs
    }

    async fn call(&self, name: &str, arguments: &Value) -> ToolOutcome {
        let Some(command) = arguments["command"].as_str() else {
            return ToolOutcome::Failure("Missing 'command' parameter".into());
        };
        debug!(tool = name, command, "local tool call");

        let result = match name {
            KUBECTL_TOOL => self.kubectl.run(command).await,
            SHELL_TOOL if self.allow_shell => executor::run_shell(command).await,
            _ => return ToolOutcome::Failure(format!("Unknown tool: {name}")),
        };

        match result {
            Ok(stdout) => ToolOutcome::Success(String::from_utf8_lossy(&stdout).into_owned()),
            Err(e) => ToolOutcome::Failure(e.to_string()),
        }
    }
}

fn truncate(s: String) -> String {
    if s.len() <= MAX_RESULT_BYTES {
        return s;
    }
    let mut cut = MAX_RESULT_BYTES;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = s[..cut].to_string();
    out.push_str("\n... [truncated]");
    out
}
