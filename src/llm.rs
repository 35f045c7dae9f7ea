use crate::config::ProviderSettings;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Model provider. Each one is reached through its
/// OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Provider {
    /// Local ollama server
    #[default]
    Ollama,
    /// Google Gemini
    Gemini,
    /// GitHub-hosted models
    Github,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Self::Ollama, Self::Gemini, Self::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
            Self::Github => "github",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Github => "https://models.github.ai/inference",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => "llama3",
            Self::Gemini => "gemini-2.0-flash",
            Self::Github => "openai/gpt-4.1-mini",
        }
    }

    /// Environment variable overriding the model name.
    pub fn model_env(&self) -> &'static str {
        match self {
            Self::Ollama => "OLLAMA_MODEL_NAME",
            Self::Gemini => "GEMINI_MODEL_NAME",
            Self::Github => "GITHUB_MODEL_NAME",
        }
    }

    /// Environment variables holding the credential, first match wins.
    ///
    /// GitHub tokens go into the slot generic OpenAI clients read, so an
    /// `OPENAI_API_KEY` is accepted when `GITHUB_TOKEN` is absent.
    pub fn api_key_envs(&self) -> &'static [&'static str] {
        match self {
            Self::Ollama => &[],
            Self::Gemini => &["GEMINI_API_KEY"],
            Self::Github => &["GITHUB_TOKEN", "OPENAI_API_KEY"],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let supported: Vec<_> = Self::ALL.iter().map(Provider::as_str).collect();
                Error::config(format!(
                    "unsupported model provider '{s}' (supported: {})",
                    supported.join(", ")
                ))
            })
    }
}

/// A tool the model may call: name, natural-language description and the
/// JSON schema of its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One message of a chat conversation, in OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as sent by the provider.
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".into()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }

    /// Decode the argument string. Empty means no arguments.
    pub fn parsed_arguments(&self) -> Result<Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(raw).map_err(|e| {
            Error::parse(format!(
                "arguments for tool '{}' are not JSON: {e}",
                self.function.name
            ))
        })
    }
}

/// What the model said back for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// A chat model capable of tool calling. [`LlmClient`] is the network
/// implementation; tests substitute scripted models.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<AssistantTurn>;

    fn model(&self) -> &str;
}

pub struct LlmClient {
    provider: Provider,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    base_url: String,
    http: HttpClient,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<&'a ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl LlmClient {
    pub fn new(
        provider: Provider,
        api_key: Option<String>,
        model: String,
        max_tokens: u32,
        base_url: Option<String>,
    ) -> Result<Self> {
        let http = HttpClient::new(concat!("kaia/", env!("CARGO_PKG_VERSION")))?;
        let base_url = base_url
            .unwrap_or_else(|| provider.default_base_url().into())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            provider,
            api_key,
            model,
            max_tokens,
            base_url,
            http,
        })
    }

    /// Build from resolved provider settings. A missing credential is not an
    /// error here; the provider rejects the first request instead.
    pub fn from_settings(settings: ProviderSettings, max_tokens: u32) -> Result<Self> {
        if settings.api_key.is_none() && !settings.provider.api_key_envs().is_empty() {
            warn!(
                provider = %settings.provider,
                "no API key found, requests will likely be rejected"
            );
        }
        Self::new(
            settings.provider,
            settings.api_key,
            settings.model,
            max_tokens,
            Some(settings.base_url),
        )
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<AssistantTurn> {
        debug!(
            provider = %self.provider,
            model = %self.model,
            messages = messages.len(),
            "sending chat request"
        );

        let system_msg = ChatMessage::System {
            content: system.to_string(),
        };
        let body = build_request_body(&self.model, self.max_tokens, &system_msg, messages, tools)?;

        let url = format!("{}/chat/completions", self.base_url);
        let response_text = self
            .http
            .post_json(&url, &body, self.api_key.as_deref())
            .await
            .map_err(|e| {
                warn!(provider = %self.provider, "chat API error: {e}");
                e
            })?;

        parse_chat_response(&response_text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn build_request_body(
    model: &str,
    max_tokens: u32,
    system: &ChatMessage,
    messages: &[ChatMessage],
    tools: &[ToolDef],
) -> Result<String> {
    let request = ChatRequest {
        model,
        max_tokens,
        messages: std::iter::once(system).chain(messages.iter()).collect(),
        tools: tools
            .iter()
            .map(|t| WireTool {
                kind: "function",
                function: WireFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.input_schema,
                },
            })
            .collect(),
    };
    serde_json::to_string(&request).map_err(|e| Error::parse(format!("serialize request: {e}")))
}

/// Decode a chat-completions response body into the first choice.
pub fn parse_chat_response(text: &str) -> Result<AssistantTurn> {
    let resp: ChatResponse = serde_json::from_str(text)
        .map_err(|e| Error::parse(format!("parse chat response: {e}")))?;

    let message = resp
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| Error::parse("empty response from LLM"))?;

    Ok(AssistantTurn {
        content: message.content,
        tool_calls: message.tool_calls.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("ollama".parse::<Provider>().unwrap(), Provider::Ollama);
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!(" GITHUB ".parse::<Provider>().unwrap(), Provider::Github);
    }

    #[test]
    fn unsupported_provider_names_value_and_supported_set() {
        let err = "invalid".parse::<Provider>().unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::Config(_)));
        assert!(msg.contains("'invalid'"), "{msg}");
        assert!(msg.contains("ollama, gemini, github"), "{msg}");
    }

    #[test]
    fn request_body_puts_system_first_and_wraps_tools() {
        let system = ChatMessage::System {
            content: "be brief".into(),
        };
        let history = vec![
            ChatMessage::user("get pods"),
            ChatMessage::Assistant {
                content: None,
                tool_calls: vec![ToolCall::new(
                    "call_1",
                    "call_kubectl",
                    &json!({"command": "get pods"}),
                )],
            },
            ChatMessage::Tool {
                tool_call_id: "call_1".into(),
                content: "No resources found".into(),
            },
        ];
        let tools = vec![ToolDef {
            name: "call_kubectl".into(),
            description: "run kubectl".into(),
            input_schema: json!({"type": "object"}),
        }];

        let body = build_request_body("llama3", 512, &system, &history, &tools).unwrap();
        let v: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(v["model"], "llama3");
        assert_eq!(v["max_tokens"], 512);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["messages"][2]["content"], Value::Null);
        assert_eq!(v["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            v["messages"][2]["tool_calls"][0]["function"]["arguments"],
            r#"{"command":"get pods"}"#
        );
        assert_eq!(v["messages"][3]["role"], "tool");
        assert_eq!(v["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(v["tools"][0]["type"], "function");
        assert_eq!(v["tools"][0]["function"]["name"], "call_kubectl");
    }

    #[test]
    fn request_body_omits_empty_tool_list() {
        let system = ChatMessage::System {
            content: String::new(),
        };
        let body = build_request_body("m", 1, &system, &[], &[]).unwrap();
        let v: Value = serde_json::from_str(&body).unwrap();
        assert!(v.get("tools").is_none());
    }

    #[test]
    fn parses_text_answer() {
        let turn = parse_chat_response(
            r#"{"choices":[{"message":{"role":"assistant","content":"3 pods running"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(turn.content.as_deref(), Some("3 pods running"));
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn parses_tool_calls_with_null_content() {
        let turn = parse_chat_response(
            r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
                {"id":"abc","type":"function","function":{"name":"execute_kubectl","arguments":"{\"command\":\"get ns\"}"}}
            ]}}]}"#,
        )
        .unwrap();
        assert!(turn.content.is_none());
        assert_eq!(turn.tool_calls.len(), 1);
        let args = turn.tool_calls[0].parsed_arguments().unwrap();
        assert_eq!(args["command"], "get ns");
    }

    #[test]
    fn tool_call_without_type_or_id_still_decodes() {
        let turn = parse_chat_response(
            r#"{"choices":[{"message":{"content":"","tool_calls":[{"function":{"name":"call_kubectl","arguments":""}}]}}]}"#,
        )
        .unwrap();
        let call = &turn.tool_calls[0];
        assert_eq!(call.kind, "function");
        assert!(call.id.is_empty());
        assert_eq!(call.parsed_arguments().unwrap(), json!({}));
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let err = parse_chat_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn client_trims_trailing_slash_from_base_url() {
        let client = LlmClient::new(
            Provider::Ollama,
            None,
            "llama3".into(),
            100,
            Some("http://localhost:1/v1/".into()),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:1/v1");
        assert_eq!(client.model(), "llama3");
        assert_eq!(client.provider(), Provider::Ollama);
    }
}
