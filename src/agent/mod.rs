//! Tool-calling agent loop.
//!
//! Each request appends the user's text to the conversation, sends it to the
//! model, executes any tool calls one at a time, and feeds the results back
//! until the model answers in plain text. That answer goes through the
//! output validator; a rejected answer is sent back with the validator's
//! hint, up to `retries` times.

pub mod prompt;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatModel, ToolCall, ToolDef};
use crate::repl::Responder;
use crate::tools::{ToolBackend, ToolOutcome};
use crate::validator::{self, Verdict};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Counters for one `respond` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub model_calls: u32,
    pub tool_calls: u32,
    pub tool_failures: u32,
    pub retries: u32,
}

pub struct Agent<M, T> {
    model: M,
    tools: T,
    system_prompt: String,
    history: Vec<ChatMessage>,
    retries: u32,
    max_tool_steps: u32,
    last_stats: RunStats,
    /// Source of ids for tool calls the provider left unnamed.
    next_call_id: u64,
}

impl<M: ChatModel, T: ToolBackend> Agent<M, T> {
    pub fn new(model: M, tools: T, system_prompt: impl Into<String>, config: &AgentConfig) -> Self {
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            retries: config.retries,
            max_tool_steps: config.max_tool_steps,
            last_stats: RunStats::default(),
            next_call_id: 0,
        }
    }

    /// Conversation so far: every committed exchange, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn last_stats(&self) -> &RunStats {
        &self.last_stats
    }

    /// Give back the tool backend, e.g. to shut down an MCP server.
    pub fn into_tools(self) -> T {
        self.tools
    }

    /// Run one request to completion.
    ///
    /// `Ok(None)` means the model produced no text. The exchange is added to
    /// the history only when this returns `Ok`.
    pub async fn run(&mut self, input: &str) -> Result<Option<String>> {
        let definitions = self.tools.definitions();
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(input));
        let mut stats = RunStats::default();
        let mut tool_steps = 0u32;

        let outcome = loop {
            let turn = self
                .model
                .chat(&self.system_prompt, &messages, &definitions)
                .await?;
            stats.model_calls += 1;

            if !turn.tool_calls.is_empty() {
                tool_steps += 1;
                if tool_steps > self.max_tool_steps {
                    warn!(limit = self.max_tool_steps, "tool step limit reached");
                    return Err(Error::ToolLoop {
                        limit: self.max_tool_steps,
                    });
                }

                let calls = with_ids(turn.tool_calls, &mut self.next_call_id);
                messages.push(ChatMessage::Assistant {
                    content: turn.content,
                    tool_calls: calls.clone(),
                });
                for call in &calls {
                    let outcome = self.execute(&definitions, call).await;
                    stats.tool_calls += 1;
                    if outcome.is_failure() {
                        stats.tool_failures += 1;
                    }
                    messages.push(ChatMessage::Tool {
                        tool_call_id: call.id.clone(),
                        content: outcome.into_message(),
                    });
                }
                continue;
            }

            let Some(text) = turn.content.clone().filter(|t| !t.trim().is_empty()) else {
                debug!("model returned no text");
                messages.push(ChatMessage::Assistant {
                    content: turn.content,
                    tool_calls: Vec::new(),
                });
                break None;
            };

            info!("validating output");
            match validator::check_output(text.clone()) {
                Verdict::Accept(answer) => {
                    messages.push(ChatMessage::assistant_text(answer.clone()));
                    break Some(answer);
                }
                Verdict::Retry { hint } => {
                    if stats.retries >= self.retries {
                        warn!(retries = self.retries, "output rejected, no retries left");
                        return Err(Error::RetriesExhausted {
                            retries: self.retries,
                        });
                    }
                    stats.retries += 1;
                    debug!(attempt = stats.retries, %hint, "output rejected, retrying");
                    messages.push(ChatMessage::assistant_text(text));
                    messages.push(ChatMessage::user(hint));
                }
            }
        };

        info!(
            model = self.model.model(),
            model_calls = stats.model_calls,
            tool_calls = stats.tool_calls,
            tool_failures = stats.tool_failures,
            retries = stats.retries,
            "request complete"
        );
        self.history = messages;
        self.last_stats = stats;
        Ok(outcome)
    }

    async fn execute(&self, definitions: &[ToolDef], call: &ToolCall) -> ToolOutcome {
        let name = call.function.name.as_str();
        if !definitions.iter().any(|d| d.name == name) {
            return ToolOutcome::Failure(format!("Unknown tool: {name}"));
        }
        let arguments = match call.parsed_arguments() {
            Ok(args) => args,
            Err(e) => return ToolOutcome::Failure(e.to_string()),
        };
        debug!(tool = name, %arguments, "executing tool");
        self.tools.call(name, &arguments).await
    }
}

/// Providers such as ollama may omit call ids; tool results need one.
/// Generated ids stay unique for the lifetime of the agent.
fn with_ids(calls: Vec<ToolCall>, next_id: &mut u64) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() {
                call.id = format!("call_{next_id}");
                *next_id += 1;
            }
            call
        })
        .collect()
}

#[async_trait]
impl<M: ChatModel, T: ToolBackend> Responder for Agent<M, T> {
    async fn respond(&mut self, input: &str) -> Result<Option<String>> {
        self.run(input).await
    }
}
