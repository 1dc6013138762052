use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_EMPTY_COMPLETION_REPLY: &str =
    "I'm sorry, I couldn't generate a response. Could you try asking something else?";
pub const DEFAULT_COMPLETION_ERROR_REPLY: &str =
    "I apologize, but I encountered an error. Can we try again?";
pub const DEFAULT_ROUTING_INSTRUCTION: &str = "You are an orchestrator assistant. You need to \
determine which specialized agent should handle each user query. Here are the rules:";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub routing: RoutingConfig,
    pub replies: ReplyConfig,
    pub agents: Vec<AgentConfig>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Sessions untouched for this long are evicted; zero keeps them until reset.
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoutingConfig {
    pub fallback: String,
    /// Classifier model; the shared `llm.model` when unset.
    pub model: Option<String>,
    pub instruction: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyConfig {
    pub empty_completion: String,
    pub completion_error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub routing_rule: String,
    pub persona: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Groq,
    Ollama,
    Anthropic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
    pub routing_fallback: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                temperature: 0.7,
                max_tokens: 1024,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 5000,
                graceful_shutdown_secs: 15,
                session_idle_secs: 1800,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            routing: RoutingConfig {
                fallback: "receptionist".to_string(),
                model: None,
                instruction: DEFAULT_ROUTING_INSTRUCTION.to_string(),
            },
            replies: ReplyConfig::default(),
            agents: default_agents(),
        }
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            empty_completion: DEFAULT_EMPTY_COMPLETION_REPLY.to_string(),
            completion_error: DEFAULT_COMPLETION_ERROR_REPLY.to_string(),
        }
    }
}

fn default_agents() -> Vec<AgentConfig> {
    let animal = |id: &str, plural: &str| AgentConfig {
        id: id.to_string(),
        labels: vec![id.to_string()],
        routing_rule: format!("handles all queries related to {plural}"),
        persona: format!("You are a friendly AI assistant who loves to talk about {plural}."),
        model: None,
        temperature: None,
    };

    vec![
        animal("cat", "cats"),
        animal("dog", "dogs"),
        animal("monkey", "monkeys"),
        AgentConfig {
            id: "receptionist".to_string(),
            labels: vec!["receptionist".to_string()],
            routing_rule: "handles any general questions or unclear intent".to_string(),
            persona: "You are a friendly AI receptionist, providing general help and directing \
                      users appropriately."
                .to_string(),
            model: None,
            temperature: None,
        },
    ]
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::Ollama => "ollama",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Ollama => "http://localhost:11434/v1",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|groq|ollama|anthropic)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AgentConfig {
    /// Declared labels, or the identifier itself when none are given.
    pub fn effective_labels(&self) -> Vec<String> {
        if self.labels.is_empty() {
            vec![self.id.clone()]
        } else {
            self.labels.clone()
        }
    }
}

impl LlmConfig {
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("minion.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(session_idle_secs) = server.session_idle_secs {
                self.server.session_idle_secs = session_idle_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(fallback) = routing.fallback {
                self.routing.fallback = fallback;
            }
            if let Some(model) = routing.model {
                self.routing.model = Some(model);
            }
            if let Some(instruction) = routing.instruction {
                self.routing.instruction = instruction;
            }
        }

        if let Some(replies) = patch.replies {
            if let Some(empty_completion) = replies.empty_completion {
                self.replies.empty_completion = empty_completion;
            }
            if let Some(completion_error) = replies.completion_error {
                self.replies.completion_error = completion_error;
            }
        }

        if let Some(agents) = patch.agents {
            self.agents = agents;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MINION_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("MINION_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MINION_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("MINION_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MINION_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("MINION_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("MINION_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MINION_LLM_TIMEOUT_SECS", &value)?;
        }
        if self.llm.provider == LlmProvider::Groq && self.llm.api_key.is_none() {
            if let Some(value) = read_env("GROQ_API_KEY") {
                self.llm.api_key = Some(secret_value(value));
            }
        }

        if let Some(value) = read_env("MINION_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MINION_SERVER_PORT") {
            self.server.port = parse_u16("MINION_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MINION_SERVER_SESSION_IDLE_SECS") {
            self.server.session_idle_secs = parse_u64("MINION_SERVER_SESSION_IDLE_SECS", &value)?;
        }

        let log_level = read_env("MINION_LOGGING_LEVEL").or_else(|| read_env("MINION_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MINION_LOGGING_FORMAT").or_else(|| read_env("MINION_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("MINION_ROUTING_FALLBACK") {
            self.routing.fallback = value;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_timeout_secs) = overrides.llm_timeout_secs {
            self.llm.timeout_secs = llm_timeout_secs;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(routing_fallback) = overrides.routing_fallback {
            self.routing.fallback = routing_fallback;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_replies(&self.replies)?;
        validate_agents(&self.agents, &self.routing)?;
        Ok(())
    }
}

/// Explicit path when it exists, else the first of `minion.toml` and `config/minion.toml` present.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("minion.toml"), PathBuf::from("config/minion.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    validate_temperature("llm.temperature", llm.temperature)?;

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.provider.requires_api_key() {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider",
                llm.provider.as_str()
            )));
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_temperature(key: &str, temperature: f32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Validation(format!("{key} must be in range 0.0..=2.0")));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_replies(replies: &ReplyConfig) -> Result<(), ConfigError> {
    if replies.empty_completion.trim().is_empty() {
        return Err(ConfigError::Validation(
            "replies.empty_completion must not be empty".to_string(),
        ));
    }
    if replies.completion_error.trim().is_empty() {
        return Err(ConfigError::Validation(
            "replies.completion_error must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_agents(agents: &[AgentConfig], routing: &RoutingConfig) -> Result<(), ConfigError> {
    if agents.is_empty() {
        return Err(ConfigError::Validation("at least one [[agents]] entry is required".to_string()));
    }

    for agent in agents {
        if agent.id.trim().is_empty() {
            return Err(ConfigError::Validation("agents.id must not be empty".to_string()));
        }
        if agent.persona.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "agents.persona must not be empty (agent `{}`)",
                agent.id
            )));
        }
        if let Some(temperature) = agent.temperature {
            validate_temperature(&format!("agents.temperature (agent `{}`)", agent.id), temperature)?;
        }
    }

    if routing.fallback.trim().is_empty() {
        return Err(ConfigError::Validation("routing.fallback must not be empty".to_string()));
    }
    if !agents.iter().any(|agent| agent.id.trim() == routing.fallback.trim()) {
        return Err(ConfigError::Validation(format!(
            "routing.fallback `{}` must name one of the configured agents",
            routing.fallback
        )));
    }
    if routing.instruction.trim().is_empty() {
        return Err(ConfigError::Validation("routing.instruction must not be empty".to_string()));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    routing: Option<RoutingPatch>,
    replies: Option<RepliesPatch>,
    agents: Option<Vec<AgentConfig>>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    fallback: Option<String>,
    model: Option<String>,
    instruction: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RepliesPatch {
    empty_completion: Option<String>,
    completion_error: Option<String>,
}
