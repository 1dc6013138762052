//! HTTP bindings for the completion backends.
//!
//! OpenAI, Groq, and Ollama all speak the chat-completions dialect; Anthropic gets its own
//! client because the system prompt travels outside the message list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use minion_core::config::{LlmConfig, LlmProvider};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, CompletionError, CompletionRequest, CompletionService, MessageRole};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone, Debug, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

fn build_http(request_timeout: Duration) -> Result<Client, CompletionError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|error| CompletionError::Transport(format!("failed to build HTTP client: {error}")))
}

async fn send_json<R: DeserializeOwned>(
    request: RequestBuilder,
    request_timeout: Duration,
) -> Result<R, CompletionError> {
    let response = request.send().await.map_err(|error| {
        if error.is_timeout() {
            CompletionError::Timeout {
                after_ms: u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            CompletionError::Transport(error.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CompletionError::Http {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    response.json::<R>().await.map_err(|error| CompletionError::Decode(error.to_string()))
}

pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    settings: ModelSettings,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        settings: ModelSettings,
        request_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            http: build_http(request_timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            settings,
            request_timeout,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatCompletionBody {
            model: &self.settings.model,
            messages: &request.messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response: ChatCompletionResponse = send_json(builder, self.request_timeout).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::Decode("response carried no choices".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

pub struct AnthropicClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    settings: ModelSettings,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct AnthropicBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<&'a ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        settings: ModelSettings,
        request_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            http: build_http(request_timeout)?,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            api_key,
            settings,
            request_timeout,
        })
    }
}

#[async_trait]
impl CompletionService for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let system = request
            .messages
            .iter()
            .filter(|message| message.role == MessageRole::System)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();
        let body = AnthropicBody {
            model: &self.settings.model,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: request
                .messages
                .iter()
                .filter(|message| message.role != MessageRole::System)
                .collect(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature.min(1.0),
        };

        let builder = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: AnthropicResponse = send_json(builder, self.request_timeout).await?;
        Ok(response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

/// Builds completion handles from `[llm]` and hands out one shared handle per distinct
/// model settings.
pub struct CompletionPool {
    llm: LlmConfig,
    handles: Vec<(ModelSettings, Arc<dyn CompletionService>)>,
}

impl CompletionPool {
    pub fn new(llm: &LlmConfig) -> Self {
        Self { llm: llm.clone(), handles: Vec::new() }
    }

    pub fn settings(&self, model: Option<&str>, temperature: Option<f32>) -> ModelSettings {
        ModelSettings {
            model: model
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(&self.llm.model)
                .to_string(),
            temperature: temperature.unwrap_or(self.llm.temperature),
            max_tokens: self.llm.max_tokens,
        }
    }

    pub fn handle(
        &mut self,
        model: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<Arc<dyn CompletionService>, CompletionError> {
        let settings = self.settings(model, temperature);
        if let Some((_, handle)) = self.handles.iter().find(|(existing, _)| *existing == settings) {
            return Ok(Arc::clone(handle));
        }

        let handle = self.connect(settings.clone())?;
        self.handles.push((settings, Arc::clone(&handle)));
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn connect(&self, settings: ModelSettings) -> Result<Arc<dyn CompletionService>, CompletionError> {
        let base_url = self.llm.resolved_base_url();
        let request_timeout = Duration::from_secs(self.llm.timeout_secs);

        match self.llm.provider {
            LlmProvider::OpenAi | LlmProvider::Groq | LlmProvider::Ollama => {
                Ok(Arc::new(OpenAiCompatibleClient::new(
                    &base_url,
                    self.llm.api_key.clone(),
                    settings,
                    request_timeout,
                )?))
            }
            LlmProvider::Anthropic => {
                let api_key = self.llm.api_key.clone().ok_or_else(|| {
                    CompletionError::Transport("anthropic provider needs an api key".to_string())
                })?;
                Ok(Arc::new(AnthropicClient::new(&base_url, api_key, settings, request_timeout)?))
            }
        }
    }
}
