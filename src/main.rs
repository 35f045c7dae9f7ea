use anyhow::Result;
use clap::Parser;
use kaia::agent::{Agent, prompt};
use kaia::config::{Config, ProviderSettings};
use kaia::executor::KubectlExecutor;
use kaia::llm::{LlmClient, Provider};
use kaia::mcp::McpClient;
use kaia::repl;
use kaia::tools::LocalTools;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Backend {
    /// Containerized MCP server over stdio
    Mcp,
    /// kubectl on this machine
    Local,
}

#[derive(Parser)]
#[command(
    name = "kaia",
    version,
    about = "Kubernetes AI assistant: ask about your cluster in plain language"
)]
struct Cli {
    /// Model provider
    #[arg(
        long,
        value_enum,
        ignore_case = true,
        env = "LLM_PROVIDER",
        default_value_t = Provider::Ollama
    )]
    provider: Provider,

    /// Model name override (otherwise <PROVIDER>_MODEL_NAME or the provider default)
    #[arg(long)]
    model: Option<String>,

    /// Where cluster commands run
    #[arg(long, value_enum, default_value_t = Backend::Mcp)]
    tools: Backend,

    /// Path to config file
    #[arg(short, long, default_value = "kaia.toml")]
    config: PathBuf,

    /// How many times a rejected answer is retried
    #[arg(long)]
    retries: Option<u32>,
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kaia=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(retries) = cli.retries {
        config.agent.retries = retries;
    }
    config.validate()?;

    let settings = ProviderSettings::from_env(
        cli.provider,
        cli.model.as_deref(),
        config.llm.base_url.as_deref(),
    );
    info!(
        provider = %settings.provider,
        model = %settings.model,
        base_url = %settings.base_url,
        "model provider selected"
    );
    let llm = LlmClient::from_settings(settings, config.llm.max_tokens)?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    match cli.tools {
        Backend::Local => {
            let tools = LocalTools::new(
                KubectlExecutor::new(config.kubectl.binary.as_str()),
                config.kubectl.allow_shell,
            );
            let mut agent = Agent::new(llm, tools, prompt::local(), &config.agent);
            repl::run(stdin, &mut stdout, &mut agent).await?;
        }
        Backend::Mcp => {
            let server = McpClient::from_config(&config.mcp, &home_dir()).await?;
            let mut agent = Agent::new(llm, server, prompt::mcp(), &config.agent);
            let session = repl::run(stdin, &mut stdout, &mut agent).await;
            agent.into_tools().shutdown().await?;
            session?;
        }
    }

    Ok(())
}
