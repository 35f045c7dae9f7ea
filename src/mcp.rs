//! MCP client over stdio: spawns the server process, performs the
//! `initialize` handshake, caches `tools/list`, and serves `tools/call`.
//!
//! Messages are newline-delimited JSON-RPC 2.0. One request is in flight at
//! a time; responses are matched by numeric id, and server-initiated
//! requests or notifications arriving in between are answered or skipped.

use crate::config::McpConfig;
use crate::error::{Error, Result};
use crate::llm::ToolDef;
use crate::tools::{ToolBackend, ToolOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
/// Grace period for the server to exit after stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Serialize)]
struct RpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
}

#[derive(Serialize)]
struct RpcReply {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<ToolInfo>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ToolInfo {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

#[derive(Deserialize)]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ContentItem>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Encode one JSON-RPC request line (without the trailing newline).
pub fn encode_request(id: u64, method: &str, params: Value) -> Result<String> {
    serde_json::to_string(&RpcRequest {
        jsonrpc: "2.0",
        id,
        method,
        params,
    })
    .map_err(|e| Error::parse(format!("serialize MCP request: {e}")))
}

struct Session {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl Session {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        let line = serde_json::to_string(&RpcNotification {
            jsonrpc: "2.0",
            method,
        })
        .map_err(|e| Error::parse(format!("serialize MCP notification: {e}")))?;
        self.write_line(&line).await
    }

    async fn reply(&mut self, reply: RpcReply) -> Result<()> {
        let line = serde_json::to_string(&reply)
            .map_err(|e| Error::parse(format!("serialize MCP reply: {e}")))?;
        self.write_line(&line).await
    }

    /// Read until the response for `id` arrives.
    async fn read_response(&mut self, id: u64) -> Result<Value> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(Error::mcp("server closed its output"));
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let msg: RpcMessage = match serde_json::from_str(line) {
                Ok(m) => m,
                Err(e) => {
                    debug!(error = %e, "skipping non-JSON line from MCP server");
                    continue;
                }
            };

            match (msg.method.as_deref(), msg.id) {
                (Some(method), Some(req_id)) => self.answer_server_request(method, req_id).await?,
                (Some(method), None) => debug!(method, "MCP notification"),
                (None, Some(resp_id)) if resp_id.as_u64() == Some(id) => {
                    if let Some(err) = msg.error {
                        return Err(Error::mcp(format!("{} (code {})", err.message, err.code)));
                    }
                    return Ok(msg.result.unwrap_or(Value::Null));
                }
                (None, other) => debug!(id = ?other, expected = id, "skipping stale MCP response"),
            }
        }
    }

    async fn answer_server_request(&mut self, method: &str, id: Value) -> Result<()> {
        debug!(method, "MCP server request");
        let reply = if method == "roots/list" {
            RpcReply {
                jsonrpc: "2.0",
                id,
                result: Some(json!({ "roots": [] })),
                error: None,
            }
        } else {
            RpcReply {
                jsonrpc: "2.0",
                id,
                result: None,
                error: Some(RpcError {
                    code: -32601,
                    message: format!("method not supported by client: {method}"),
                }),
            }
        };
        self.reply(reply).await
    }
}

/// A running MCP server subprocess and its cached tool list.
pub struct McpClient {
    session: Mutex<Session>,
    child: Mutex<Child>,
    tools: Vec<ToolDef>,
    timeout: Duration,
}

impl McpClient {
    /// Launch the containerized server described by `config`.
    pub async fn from_config(config: &McpConfig, home: &Path) -> Result<Self> {
        let args = config.container_args(home);
        Self::spawn(
            &config.runtime,
            &args,
            Duration::from_secs(config.timeout_secs),
        )
        .await
    }

    /// Spawn `program args...`, complete the handshake, and list tools.
    /// Each round trip is bounded by `round_trip`.
    pub async fn spawn(program: &str, args: &[String], round_trip: Duration) -> Result<Self> {
        info!(program, args = ?args, "starting MCP server");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::mcp("server stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::mcp("server stdout unavailable"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "kaia::mcp::server", "{line}");
                }
            });
        }

        let mut client = Self {
            session: Mutex::new(Session {
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 1,
            }),
            child: Mutex::new(child),
            tools: Vec::new(),
            timeout: round_trip,
        };

        client.initialize().await?;
        client.tools = client.list_tools().await?;
        let names: Vec<&str> = client.tools.iter().map(|t| t.name.as_str()).collect();
        info!(tools = ?names, "MCP server ready");
        Ok(client)
    }

    async fn initialize(&self) -> Result<()> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "kaia",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;
        debug!(
            server = %result["serverInfo"]["name"],
            protocol = %result["protocolVersion"],
            "MCP initialized"
        );
        self.session
            .lock()
            .await
            .notify("notifications/initialized")
            .await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDef>> {
        let mut defs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let page: ListToolsResult = serde_json::from_value(self.request("tools/list", params).await?)
                .map_err(|e| Error::parse(format!("parse tools/list result: {e}")))?;
            defs.extend(page.tools.into_iter().map(|t| ToolDef {
                description: t.description.unwrap_or_default(),
                input_schema: t
                    .input_schema
                    .unwrap_or_else(|| json!({ "type": "object" })),
                name: t.name,
            }));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(defs)
    }

    /// One request/response round trip, bounded by the configured timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let mut session = self.session.lock().await;
        let id = session.next_id;
        session.next_id += 1;

        let line = encode_request(id, method, params)?;
        debug!(id, method, "MCP request");
        session.write_line(&line).await?;

        match timeout(self.timeout, session.read_response(id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::mcp(format!(
                "{method} timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
        }
    }

    /// Close stdin and wait briefly for the server to exit, then kill it.
    pub async fn shutdown(self) -> Result<()> {
        let Self { session, child, .. } = self;
        drop(session);
        let mut child = child.into_inner();

        match timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(?status, "MCP server exited");
            }
            Err(_) => {
                warn!("MCP server did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ToolBackend for McpClient {
    fn definitions(&self) -> Vec<ToolDef> {
        self.tools.clone()
    }

    async fn call(&self, name: &str, arguments: &Value) -> ToolOutcome {
        let params = json!({ "name": name, "arguments": arguments });
        let raw = match self.request("tools/call", params).await {
            Ok(v) => v,
            Err(e) => return ToolOutcome::Failure(e.to_string()),
        };
        let result: CallToolResult = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::Failure(format!("malformed tools/call result: {e}")),
        };

        let text = result
            .content
            .into_iter()
            .map(|item| match item.text {
                Some(text) if item.kind == "text" => text,
                _ => format!("[{} content omitted]", item.kind),
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error {
            ToolOutcome::Failure(text)
        } else {
            ToolOutcome::Success(text)
        }
    }
}
