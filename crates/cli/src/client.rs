use std::time::Duration;

use minion_core::config::{AppConfig, LoadOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FALLBACK_SERVER_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach minion-server at {url}: {message}")]
    Transport { url: String, message: String },
    #[error("minion-server answered HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("unexpected response from minion-server: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Server { .. } => "server_error",
            Self::Decode(_) => "decode",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Transport { .. } => 3,
            Self::Server { .. } | Self::Decode(_) => 4,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    userquestion: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub agent: String,
    pub session_id: String,
    pub routed_by: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

pub struct ChatClient {
    base_url: String,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            ClientError::Transport { url: base_url.clone(), message: error.to_string() }
        })?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn ask(
        &self,
        question: &str,
        session_id: Option<&str>,
    ) -> Result<ChatReply, ClientError> {
        let url = format!("{}/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&ChatPayload { userquestion: question, session_id })
            .send()
            .await
            .map_err(|error| ClientError::Transport { url: url.clone(), message: error.to_string() })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ClientError::Transport { url, message: error.to_string() })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorPayload>(&body)
                .map(|payload| payload.error)
                .unwrap_or(body);
            return Err(ClientError::Server { status: status.as_u16(), message });
        }

        serde_json::from_str(&body).map_err(|error| ClientError::Decode(error.to_string()))
    }
}

/// Server address and request timeout for one command, resolved from a single config load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub timeout: Duration,
}

impl ClientSettings {
    pub fn resolve(explicit_server: Option<&str>) -> Self {
        let config = AppConfig::load(LoadOptions::default()).ok();
        Self::from_config(explicit_server, config.as_ref())
    }

    /// Explicit `--server` value, else the address the server would bind from local config.
    pub fn from_config(explicit_server: Option<&str>, config: Option<&AppConfig>) -> Self {
        let server_url = match explicit_server.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => url.to_string(),
            None => config.map_or_else(|| FALLBACK_SERVER_URL.to_string(), local_server_url),
        };
        let secs = config.map_or(30, |config| config.llm.timeout_secs);

        // Two completion calls per question, plus slack for the HTTP hop.
        let timeout = Duration::from_secs(secs.saturating_mul(2).saturating_add(5));
        Self { server_url, timeout }
    }

    pub fn client(&self) -> Result<ChatClient, ClientError> {
        ChatClient::new(&self.server_url, self.timeout)
    }
}

fn local_server_url(config: &AppConfig) -> String {
    let host = match config.server.bind_address.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{}", config.server.port)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use minion_core::AppConfig;

    use super::{ClientSettings, FALLBACK_SERVER_URL};

    #[test]
    fn explicit_server_wins_over_config() {
        let config = AppConfig::default();
        let settings = ClientSettings::from_config(Some(" http://10.0.0.5:8080 "), Some(&config));

        assert_eq!(settings.server_url, "http://10.0.0.5:8080");
        assert_eq!(settings.timeout, Duration::from_secs(65));
    }

    #[test]
    fn wildcard_bind_address_maps_to_loopback() {
        let mut config = AppConfig::default();
        config.server.bind_address = "0.0.0.0".to_string();
        config.server.port = 7000;
        config.llm.timeout_secs = 10;

        let settings = ClientSettings::from_config(None, Some(&config));

        assert_eq!(settings.server_url, "http://127.0.0.1:7000");
        assert_eq!(settings.timeout, Duration::from_secs(25));
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let settings = ClientSettings::from_config(Some("  "), None);

        assert_eq!(settings.server_url, FALLBACK_SERVER_URL);
        assert_eq!(settings.timeout, Duration::from_secs(65));
    }
}
