pub mod agent;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod llm;
pub mod mcp;
pub mod repl;
pub mod tools;
pub mod validator;
