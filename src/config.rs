use crate::error::{Error, Result};
use crate::llm::Provider;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional `kaia.toml` file. Every section and field has a default, so a
/// missing file and an empty file behave the same.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub kubectl: KubectlConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// How many times a rejected answer is sent back to the model.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Upper bound on tool-calling rounds per request.
    #[serde(default = "default_max_tool_steps")]
    pub max_tool_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            max_tool_steps: default_max_tool_steps(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct KubectlConfig {
    #[serde(default = "default_kubectl_binary")]
    pub binary: String,
    /// Also register the unrestricted `call_shell` tool.
    #[serde(default)]
    pub allow_shell: bool,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: default_kubectl_binary(),
            allow_shell: false,
        }
    }
}

/// How to launch the containerized MCP server.
#[derive(Debug, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_network")]
    pub network: String,
    /// Host kube config directory; `$HOME/.kube` when unset.
    pub kube_dir: Option<PathBuf>,
    #[serde(default = "default_container_kube_dir")]
    pub container_kube_dir: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            image: default_image(),
            network: default_network(),
            kube_dir: None,
            container_kube_dir: default_container_kube_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl McpConfig {
    /// Container runtime arguments: host networking, interactive stdio, and
    /// a read-only mount of the kube config directory.
    pub fn container_args(&self, home: &Path) -> Vec<String> {
        let kube_dir = self
            .kube_dir
            .clone()
            .unwrap_or_else(|| home.join(".kube"));
        vec![
            "run".into(),
            format!("--network={}", self.network),
            "-i".into(),
            "-v".into(),
            format!(
                "{}:{}:ro",
                kube_dir.display(),
                self.container_kube_dir
            ),
            self.image.clone(),
        ]
    }
}

fn default_retries() -> u32 {
    3
}
fn default_max_tool_steps() -> u32 {
    10
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_kubectl_binary() -> String {
    "kubectl".into()
}
fn default_runtime() -> String {
    "docker".into()
}
fn default_image() -> String {
    "ghcr.io/alexei-led/k8s-mcp-server:latest".into()
}
fn default_network() -> String {
    "host".into()
}
fn default_container_kube_dir() -> String {
    "/home/appuser/.kube".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent.max_tool_steps == 0 {
            return Err(Error::config("agent.max_tool_steps must be at least 1"));
        }
        if self.mcp.timeout_secs == 0 {
            return Err(Error::config("mcp.timeout_secs must be at least 1"));
        }
        if self.mcp.image.trim().is_empty() {
            return Err(Error::config("mcp.image must not be empty"));
        }
        if self.kubectl.binary.trim().is_empty() {
            return Err(Error::config("kubectl.binary must not be empty"));
        }
        Ok(())
    }
}

/// Everything needed to reach one model provider, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderSettings {
    /// Resolve settings through `lookup` (an environment reader).
    ///
    /// Model precedence: `model_override`, then the provider's model
    /// variable, then the built-in default. Empty values count as unset.
    pub fn resolve<F>(
        provider: Provider,
        model_override: Option<&str>,
        base_url_override: Option<&str>,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model = model_override
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or_else(|| non_empty(provider.model_env()))
            .unwrap_or_else(|| provider.default_model().into());

        let api_key = provider
            .api_key_envs()
            .iter()
            .find_map(|key| non_empty(*key));

        let base_url = base_url_override
            .map(str::to_string)
            .unwrap_or_else(|| provider.default_base_url().into());

        Self {
            provider,
            model,
            base_url,
            api_key,
        }
    }

    pub fn from_env(
        provider: Provider,
        model_override: Option<&str>,
        base_url_override: Option<&str>,
    ) -> Self {
        Self::resolve(provider, model_override, base_url_override, |key| {
            std::env::var(key).ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn full_config_parses() {
        let toml = r#"
[agent]
retries = 5
max_tool_steps = 4

[llm]
max_tokens = 2048
base_url = "http://gpu-box:11434/v1"

[kubectl]
binary = "/usr/local/bin/kubectl"
allow_shell = true

[mcp]
runtime = "podman"
image = "example.org/k8s-mcp:1"
network = "bridge"
kube_dir = "/etc/kube"
timeout_secs = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.retries, 5);
        assert_eq!(config.agent.max_tool_steps, 4);
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.llm.base_url.as_deref(), Some("http://gpu-box:11434/v1"));
        assert!(config.kubectl.allow_shell);
        assert_eq!(config.mcp.runtime, "podman");
        assert_eq!(config.mcp.timeout_secs, 5);
        assert_eq!(config.mcp.container_kube_dir, "/home/appuser/.kube");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.agent.retries, 3);
        assert_eq!(config.agent.max_tool_steps, 10);
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.kubectl.binary, "kubectl");
        assert!(!config.kubectl.allow_shell);
        assert_eq!(config.mcp.runtime, "docker");
        assert_eq!(config.mcp.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("does/not/exist/kaia.toml")).unwrap();
        assert_eq!(config.agent.retries, 3);
    }

    #[test]
    fn validate_rejects_zero_timeout_and_empty_image() {
        let mut config = Config::default();
        config.mcp.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.mcp.image = "  ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.agent.max_tool_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn container_args_mount_home_kube_dir_read_only() {
        let args = McpConfig::default().container_args(Path::new("/home/dev"));
        assert_eq!(
            args,
            vec![
                "run",
                "--network=host",
                "-i",
                "-v",
                "/home/dev/.kube:/home/appuser/.kube:ro",
                "ghcr.io/alexei-led/k8s-mcp-server:latest",
            ]
        );
    }

    #[test]
    fn container_args_prefer_configured_kube_dir() {
        let cfg = McpConfig {
            kube_dir: Some(PathBuf::from("/srv/kube")),
            ..McpConfig::default()
        };
        let args = cfg.container_args(Path::new("/home/dev"));
        assert_eq!(args[4], "/srv/kube:/home/appuser/.kube:ro");
    }

    #[test]
    fn each_provider_resolves_defaults_without_env() {
        for provider in Provider::ALL {
            let s = ProviderSettings::resolve(provider, None, None, lookup_in(&[]));
            assert_eq!(s.model, provider.default_model());
            assert_eq!(s.base_url, provider.default_base_url());
            assert!(s.api_key.is_none());
        }
    }

    #[test]
    fn provider_model_env_overrides_default() {
        let env = lookup_in(&[
            ("OLLAMA_MODEL_NAME", "custom-ollama"),
            ("GEMINI_MODEL_NAME", "gemini-pro"),
            ("GITHUB_MODEL_NAME", "custom-github"),
        ]);
        assert_eq!(
            ProviderSettings::resolve(Provider::Ollama, None, None, &env).model,
            "custom-ollama"
        );
        assert_eq!(
            ProviderSettings::resolve(Provider::Gemini, None, None, &env).model,
            "gemini-pro"
        );
        assert_eq!(
            ProviderSettings::resolve(Provider::Github, None, None, &env).model,
            "custom-github"
        );
    }

    #[test]
    fn explicit_model_beats_env() {
        let env = lookup_in(&[("OLLAMA_MODEL_NAME", "from-env")]);
        let s = ProviderSettings::resolve(Provider::Ollama, Some("mistral"), None, env);
        assert_eq!(s.model, "mistral");
    }

    #[test]
    fn github_token_becomes_generic_api_key() {
        let s = ProviderSettings::resolve(
            Provider::Github,
            None,
            None,
            lookup_in(&[("GITHUB_TOKEN", "ghp_fake"), ("OPENAI_API_KEY", "sk-other")]),
        );
        assert_eq!(s.api_key.as_deref(), Some("ghp_fake"));

        let s = ProviderSettings::resolve(
            Provider::Github,
            None,
            None,
            lookup_in(&[("OPENAI_API_KEY", "sk-other")]),
        );
        assert_eq!(s.api_key.as_deref(), Some("sk-other"));
    }

    #[test]
    fn ollama_ignores_credentials_and_empty_values_are_unset() {
        let env = lookup_in(&[("GITHUB_TOKEN", "ghp"), ("OLLAMA_MODEL_NAME", "")]);
        let s = ProviderSettings::resolve(Provider::Ollama, None, None, env);
        assert!(s.api_key.is_none());
        assert_eq!(s.model, "llama3");
    }

    #[test]
    fn base_url_override_applies() {
        let s = ProviderSettings::resolve(
            Provider::Gemini,
            None,
            Some("http://proxy/v1"),
            lookup_in(&[("GEMINI_API_KEY", "k")]),
        );
        assert_eq!(s.base_url, "http://proxy/v1");
        assert_eq!(s.api_key.as_deref(), Some("k"));
    }
}
