use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use textback_core::config::{LlmConfig, LlmProvider};
use thiserror::Error;
use tracing::warn;

/// Role of one entry in the transcript sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// One completion request: a system prompt plus the running transcript,
/// ending with the sender's latest message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model rate limit hit (HTTP {status})")]
    RateLimited { status: u16 },
    #[error("model endpoint returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

impl LlmError {
    /// Transport hiccups and server-side errors are worth one more try
    /// inside a webhook turn; rate limits and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::RateLimited { .. } | Self::Decode(_) => false,
        }
    }
}

/// Turns a chat transcript into one model-written reply.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// HTTP client covering OpenAI-compatible, Anthropic, and Ollama chat
/// endpoints. The wire shape differs per provider; callers only see text.
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        let base_url = match &config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match config.provider {
                LlmProvider::OpenAi => "https://api.openai.com/v1".to_string(),
                LlmProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
                LlmProvider::Ollama => "http://localhost:11434".to_string(),
            },
        };

        Ok(Self {
            client,
            provider: config.provider,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String, LlmError> {
        match self.provider {
            LlmProvider::OpenAi => self.send_openai(request).await,
            LlmProvider::Anthropic => self.send_anthropic(request).await,
            LlmProvider::Ollama => self.send_ollama(request).await,
        }
    }

    async fn send_openai(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut messages = vec![json!({"role": "system", "content": request.system})];
        for message in &request.messages {
            messages.push(json!({"role": message.role.as_str(), "content": message.content}));
        }
        let payload = json!({"model": self.model, "messages": messages});

        let mut builder = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        let body = read_response(builder.send().await?).await?;

        let parsed: OpenAiResponse =
            serde_json::from_str(&body).map_err(|err| LlmError::Decode(format!("{err}: {body}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Decode("response carried no choices".to_string()))
    }

    async fn send_anthropic(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/messages", self.base_url);
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
            .collect();
        let payload = json!({
            "model": self.model,
            "max_tokens": 1024,
            "system": request.system,
            "messages": messages,
        });

        let mut builder =
            self.client.post(&url).header("anthropic-version", "2023-06-01").json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key.expose_secret());
        }
        let body = read_response(builder.send().await?).await?;

        let parsed: AnthropicResponse =
            serde_json::from_str(&body).map_err(|err| LlmError::Decode(format!("{err}: {body}")))?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| (block.kind == "text").then_some(block.text))
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Err(LlmError::Decode("response carried no text blocks".to_string()));
        }
        Ok(text)
    }

    async fn send_ollama(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut messages = vec![json!({"role": "system", "content": request.system})];
        for message in &request.messages {
            messages.push(json!({"role": message.role.as_str(), "content": message.content}));
        }
        let payload = json!({"model": self.model, "messages": messages, "stream": false});

        let body = read_response(self.client.post(&url).json(&payload).send().await?).await?;

        let parsed: OllamaResponse =
            serde_json::from_str(&body).map_err(|err| LlmError::Decode(format!("{err}: {body}")))?;
        Ok(parsed.message.content)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.retry",
                        attempt,
                        error = %err,
                        "retrying model request"
                    );
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn read_response(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    if status == 429 {
        return Err(LlmError::RateLimited { status });
    }
    if !(200..300).contains(&status) {
        return Err(LlmError::Api { status, body });
    }
    Ok(body)
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use textback_core::config::{LlmConfig, LlmProvider};

    use super::{HttpLlmClient, LlmError};

    fn config(provider: LlmProvider, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: None,
            base_url: base_url.map(str::to_string),
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn default_base_urls_follow_the_provider() {
        let openai = HttpLlmClient::from_config(&config(LlmProvider::OpenAi, None)).unwrap();
        assert_eq!(openai.base_url, "https://api.openai.com/v1");

        let anthropic = HttpLlmClient::from_config(&config(LlmProvider::Anthropic, None)).unwrap();
        assert_eq!(anthropic.base_url, "https://api.anthropic.com/v1");

        let ollama = HttpLlmClient::from_config(&config(LlmProvider::Ollama, None)).unwrap();
        assert_eq!(ollama.base_url, "http://localhost:11434");
    }

    #[test]
    fn configured_base_url_wins_and_drops_trailing_slashes() {
        let client =
            HttpLlmClient::from_config(&config(LlmProvider::OpenAi, Some("http://llm.internal/v1/")))
                .unwrap();
        assert_eq!(client.base_url, "http://llm.internal/v1");
    }

    #[test]
    fn retry_classification_matches_the_error_taxonomy() {
        assert!(LlmError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Api { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::RateLimited { status: 429 }.is_retryable());
        assert!(!LlmError::Decode("bad json".to_string()).is_retryable());
    }
}
