use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({platform}): {message}")]
    Api {
        platform: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Rate limited by {platform}")]
    RateLimit {
        platform: String,
        retry_after_secs: Option<u64>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} failed ({}): {output}", describe_status(.exit_code))]
    Command {
        program: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Output still rejected after {retries} retries")]
    RetriesExhausted { retries: u32 },

    #[error("Agent exceeded {limit} tool steps without answering")]
    ToolLoop { limit: u32 },
}

impl Error {
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn api_with_status(
        platform: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn mcp(msg: impl Into<String>) -> Self {
        Self::Mcp(msg.into())
    }

    pub fn command(
        program: impl Into<String>,
        exit_code: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        Self::Command {
            program: program.into(),
            exit_code,
            output: output.into(),
        }
    }
}

fn describe_status(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit status {code}"),
        None => "no exit status".into(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
