use std::env;
use std::fs;
use std::path::Path;

use minion_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "llm.provider",
        config.llm.provider.as_str(),
        source("llm.provider", &["MINION_LLM_PROVIDER"]),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", &["MINION_LLM_MODEL"])));
    lines.push(render_line(
        "llm.base_url",
        &config.llm.resolved_base_url(),
        source("llm.base_url", &["MINION_LLM_BASE_URL"]),
    ));

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_key(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let key_env: &[&str] = if env::var_os("MINION_LLM_API_KEY").is_none()
        && config.llm.provider.as_str() == "groq"
    {
        &["GROQ_API_KEY"]
    } else {
        &["MINION_LLM_API_KEY"]
    };
    lines.push(render_line("llm.api_key", &api_key, source("llm.api_key", key_env)));

    lines.push(render_line(
        "llm.temperature",
        &config.llm.temperature.to_string(),
        source("llm.temperature", &["MINION_LLM_TEMPERATURE"]),
    ));
    lines.push(render_line(
        "llm.max_tokens",
        &config.llm.max_tokens.to_string(),
        source("llm.max_tokens", &[]),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", &["MINION_LLM_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["MINION_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["MINION_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "server.session_idle_secs",
        &config.server.session_idle_secs.to_string(),
        source("server.session_idle_secs", &["MINION_SERVER_SESSION_IDLE_SECS"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["MINION_LOGGING_LEVEL", "MINION_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["MINION_LOGGING_FORMAT", "MINION_LOG_FORMAT"]),
    ));

    lines.push(render_line(
        "routing.fallback",
        &config.routing.fallback,
        source("routing.fallback", &["MINION_ROUTING_FALLBACK"]),
    ));
    lines.push(render_line(
        "routing.model",
        config.routing.model.as_deref().unwrap_or("<llm.model>"),
        source("routing.model", &[]),
    ));

    let agent_ids = config.agents.iter().map(|agent| agent.id.as_str()).collect::<Vec<_>>();
    lines.push(render_line("agents", &agent_ids.join(", "), source("agents", &[])));

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
