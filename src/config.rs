//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the `-f` path) into private `Raw*` shapes,
//! resolves defaults, then layers environment values on top. Secrets (seed
//! phrase, API keys) are only ever read from the environment, never TOML.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// `[agent]` section.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name advertised to the directory service.
    pub name: String,
    /// Free-text description sent with the registration.
    pub description: String,
    pub log_level: String,
    /// Append logs here instead of stderr (already `~`-expanded).
    pub log_file: Option<PathBuf>,
}

/// `[transport]` section.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Socket address the envelope server binds to.
    pub bind: String,
    /// Publicly reachable `/submit` URL advertised at registration.
    pub endpoint_url: String,
    /// Mailbox relay used for peers with no entry in `peers`.
    pub relay_url: Option<String>,
    /// Capacity of the inbound envelope queue.
    pub bus_buffer: usize,
    /// address -> submit URL for directly reachable peers.
    pub peers: HashMap<String, String>,
}

/// OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    /// Sampling temperature; `None` leaves it to the backend.
    pub temperature: Option<f32>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Output token budget per completion.
    pub max_tokens: u32,
    /// Fail every completion up front when no API key is set.
    pub require_api_key: bool,
}

/// `[llm]` section.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider (`"openai"` or `"dummy"`), `default` in TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// `[directory]` section.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

/// Fully-resolved process configuration. Loaded once in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent: AgentConfig,
    pub transport: TransportConfig,
    pub llm: LlmConfig,
    pub directory: DirectoryConfig,
    /// `AGENT_SEED_PHRASE`; `None` means an ephemeral identity.
    pub seed_phrase: Option<String>,
    /// `ILABS_AGENTVERSE_API_KEY`; `None` disables registration.
    pub directory_api_key: Option<String>,
    /// `ASI_API_KEY`, falling back to `LLM_API_KEY`.
    pub llm_api_key: Option<String>,
}

impl Config {
    /// Registration runs only when both the directory key and the seed are set.
    pub fn registration_enabled(&self) -> bool {
        self.directory_api_key.is_some() && self.seed_phrase.is_some()
    }
}

/// Values taken from the process environment. Tests build this directly
/// instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub log_level: Option<String>,
    pub seed_phrase: Option<String>,
    pub directory_api_key: Option<String>,
    pub llm_api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            log_level: non_empty_var("ASI1_AGENT_LOG_LEVEL"),
            seed_phrase: non_empty_var("AGENT_SEED_PHRASE"),
            directory_api_key: non_empty_var("ILABS_AGENTVERSE_API_KEY"),
            llm_api_key: non_empty_var("ASI_API_KEY").or_else(|| non_empty_var("LLM_API_KEY")),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ── Raw TOML shape ───────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    transport: RawTransport,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    directory: RawDirectory,
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_agent_name")]
    name: String,
    #[serde(default = "default_agent_description")]
    description: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: default_agent_description(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

#[derive(Deserialize)]
struct RawTransport {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_endpoint_url")]
    endpoint_url: String,
    #[serde(default)]
    relay_url: Option<String>,
    #[serde(default = "default_bus_buffer")]
    bus_buffer: usize,
    #[serde(default)]
    peers: HashMap<String, String>,
}

impl Default for RawTransport {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            endpoint_url: default_endpoint_url(),
            relay_url: None,
            bus_buffer: default_bus_buffer(),
            peers: HashMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAi,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAi::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default = "default_llm_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_true")]
    require_api_key: bool,
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: None,
            timeout_seconds: default_llm_timeout_seconds(),
            max_tokens: default_max_tokens(),
            require_api_key: true,
        }
    }
}

#[derive(Deserialize)]
struct RawDirectory {
    #[serde(default = "default_directory_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_directory_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawDirectory {
    fn default() -> Self {
        Self {
            api_base_url: default_directory_api_base_url(),
            timeout_seconds: default_directory_timeout_seconds(),
        }
    }
}

fn default_agent_name() -> String { "asi1-agent".to_string() }
fn default_agent_description() -> String {
    "An AI assistant powered by ASI (Agentic Systems Interface) that can help answer questions and process queries.".to_string()
}
fn default_log_level() -> String { "info".to_string() }
fn default_bind() -> String { "0.0.0.0:8001".to_string() }
fn default_endpoint_url() -> String { "http://127.0.0.1:8001/submit".to_string() }
fn default_bus_buffer() -> usize { 64 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_openai_api_base_url() -> String { "https://api.asi1.ai/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "asi1".to_string() }
fn default_llm_timeout_seconds() -> u64 { 60 }
fn default_max_tokens() -> u32 { 2048 }
fn default_directory_api_base_url() -> String { "https://agentverse.ai/v2".to_string() }
fn default_directory_timeout_seconds() -> u64 { 30 }
fn default_true() -> bool { true }

// ── Loading ──────────────────────────────────────────────────────────────────

/// Load config from `path` (or `config/default.toml`), then apply env values.
///
/// A missing default file is not an error: every field has a default. An
/// explicitly requested file that cannot be read is.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let env = EnvOverrides::from_env();
    match path {
        Some(p) => load_from(Path::new(p), &env),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_from(default_path, &env)
            } else {
                Ok(resolve(RawConfig::default(), &env))
            }
        }
    }
}

/// Load from an explicit TOML file with explicit env values.
pub fn load_from(path: &Path, env: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_str(&raw, env).map_err(|e| match e {
        AppError::Config(msg) => AppError::Config(format!("{msg} in {}", path.display())),
        other => other,
    })
}

/// Parse TOML text and resolve it against `env`.
pub fn parse_str(raw: &str, env: &EnvOverrides) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;
    validate(&parsed)?;
    Ok(resolve(parsed, env))
}

fn validate(parsed: &RawConfig) -> Result<(), AppError> {
    if parsed.transport.bus_buffer == 0 {
        return Err(AppError::Config("transport.bus_buffer must be greater than 0".into()));
    }
    if parsed.llm.openai.max_tokens == 0 {
        return Err(AppError::Config("llm.openai.max_tokens must be greater than 0".into()));
    }
    Ok(())
}

fn resolve(parsed: RawConfig, env: &EnvOverrides) -> Config {
    let a = parsed.agent;
    let t = parsed.transport;
    let o = parsed.llm.openai;

    Config {
        agent: AgentConfig {
            name: a.name,
            description: a.description,
            log_level: env.log_level.clone().unwrap_or(a.log_level),
            log_file: a.log_file.as_deref().map(expand_home),
        },
        transport: TransportConfig {
            bind: t.bind,
            endpoint_url: t.endpoint_url,
            relay_url: t.relay_url.filter(|u| !u.trim().is_empty()),
            bus_buffer: t.bus_buffer,
            peers: t.peers,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: o.api_base_url,
                model: o.model,
                temperature: o.temperature,
                timeout_seconds: o.timeout_seconds,
                max_tokens: o.max_tokens,
                require_api_key: o.require_api_key,
            },
        },
        directory: DirectoryConfig {
            api_base_url: parsed.directory.api_base_url,
            timeout_seconds: parsed.directory.timeout_seconds,
        },
        seed_phrase: env.seed_phrase.clone(),
        directory_api_key: env.directory_api_key.clone(),
        llm_api_key: env.llm_api_key.clone(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for tests: dummy LLM, no secrets, loopback addresses.
impl Config {
    pub fn test_default() -> Self {
        let mut cfg = resolve(RawConfig::default(), &EnvOverrides::default());
        cfg.llm.provider = "dummy".into();
        cfg.llm.openai.api_base_url = "http://127.0.0.1:9/v1/chat/completions".into();
        cfg.llm.openai.timeout_seconds = 1;
        cfg.transport.bind = "127.0.0.1:0".into();
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_TOML: &str = r#"
[agent]
name = "test-agent"
description = "answers things"
log_level = "debug"

[transport]
bind = "127.0.0.1:9001"
endpoint_url = "https://agent.example.org/submit"
relay_url = "https://relay.example.org/submit"

[transport.peers]
agent1qpeer = "http://10.0.0.2:8001/submit"

[llm]
default = "openai"

[llm.openai]
model = "asi1-mini"
max_tokens = 512
temperature = 0.3
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_str("", &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.agent.name, "asi1-agent");
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.openai.model, "asi1");
        assert_eq!(cfg.llm.openai.max_tokens, 2048);
        assert_eq!(cfg.llm.openai.api_base_url, "https://api.asi1.ai/v1/chat/completions");
        assert!(cfg.llm.openai.require_api_key);
        assert_eq!(cfg.transport.bus_buffer, 64);
        assert!(cfg.transport.relay_url.is_none());
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(FULL_TOML);
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.agent.name, "test-agent");
        assert_eq!(cfg.agent.log_level, "debug");
        assert_eq!(cfg.transport.bind, "127.0.0.1:9001");
        assert_eq!(cfg.transport.relay_url.as_deref(), Some("https://relay.example.org/submit"));
        assert_eq!(
            cfg.transport.peers.get("agent1qpeer").map(String::as_str),
            Some("http://10.0.0.2:8001/submit")
        );
        assert_eq!(cfg.llm.openai.model, "asi1-mini");
        assert_eq!(cfg.llm.openai.max_tokens, 512);
        assert_eq!(cfg.llm.openai.temperature, Some(0.3));
    }

    #[test]
    fn env_values_layer_on_top() {
        let env = EnvOverrides {
            log_level: Some("trace".into()),
            seed_phrase: Some("my seed".into()),
            directory_api_key: Some("av-key".into()),
            llm_api_key: Some("sk-test".into()),
        };
        let cfg = parse_str("[agent]\nlog_level = \"warn\"\n", &env).unwrap();
        assert_eq!(cfg.agent.log_level, "trace");
        assert_eq!(cfg.seed_phrase.as_deref(), Some("my seed"));
        assert_eq!(cfg.llm_api_key.as_deref(), Some("sk-test"));
        assert!(cfg.registration_enabled());
    }

    #[test]
    fn registration_needs_both_credentials() {
        let only_key = EnvOverrides { directory_api_key: Some("k".into()), ..Default::default() };
        assert!(!parse_str("", &only_key).unwrap().registration_enabled());

        let only_seed = EnvOverrides { seed_phrase: Some("s".into()), ..Default::default() };
        assert!(!parse_str("", &only_seed).unwrap().registration_enabled());
    }

    #[test]
    fn zero_bus_buffer_rejected() {
        let err = parse_str("[transport]\nbus_buffer = 0\n", &EnvOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("bus_buffer"));
    }

    #[test]
    fn blank_relay_url_is_none() {
        let cfg = parse_str("[transport]\nrelay_url = \"  \"\n", &EnvOverrides::default()).unwrap();
        assert!(cfg.transport.relay_url.is_none());
    }

    #[test]
    fn invalid_toml_errors() {
        let f = write_toml("[agent\nname = ");
        let msg = load_from(f.path(), &EnvOverrides::default()).unwrap_err().to_string();
        assert!(msg.contains("config error"));
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &EnvOverrides::default());
        assert!(result.unwrap_err().to_string().contains("cannot read"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/asi1-agent.log");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with("asi1-agent.log"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/var/log/agent.log"), PathBuf::from("/var/log/agent.log"));
    }
}
