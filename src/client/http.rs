//! OpenAI-compatible HTTP language-model client.
//!
//! Epistemic foundation:
//! - K_i: The chat-completions schema is the de facto standard; aggregators
//!   (OpenRouter) and on-prem servers (vLLM, Ollama) all speak it
//! - B_i: The API responds within the timeout (might fail)
//! - I^B: Network availability is unknowable → bounded retry with backoff

use crate::client::{CompletionOptions, LanguageModel};
use crate::models::{ClientConfig, PhronesisError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a non-success status to the error taxonomy: server errors and rate
/// limiting are retryable model-call failures, other client errors (auth,
/// malformed request) are terminal rejections.
fn status_error(status: reqwest::StatusCode, message: &str) -> PhronesisError {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        PhronesisError::ModelCall(format!("HTTP {status}: {message}"))
    } else {
        PhronesisError::ModelRejected(format!("HTTP {status}: {message}"))
    }
}

/// Default [`LanguageModel`] implementation over an OpenAI-compatible
/// chat-completions endpoint.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    config: ClientConfig,
    api_key: Option<String>,
}

impl HttpLanguageModel {
    /// Create a client from config, resolving the API key.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.resolve_api_key().ok();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(PhronesisError::Network)?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    async fn send_once(
        &self,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PhronesisError::Timeout(timeout)
                } else {
                    PhronesisError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(status_error(status, &message));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            PhronesisError::InvalidModelResponse(format!("malformed completion body: {e}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                PhronesisError::InvalidModelResponse("no choices in response".to_string())
            })
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, prompt: &str, opts: &CompletionOptions) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: opts.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: opts.temperature.unwrap_or(self.config.temperature),
        };
        let timeout = opts
            .timeout
            .unwrap_or(Duration::from_secs(self.config.timeout_secs));

        let mut last_error = None;
        for attempt in 0..self.config.max_retries.max(1) {
            match self.send_once(&request, timeout).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable || attempt + 1 >= self.config.max_retries.max(1) {
                        break;
                    }
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    debug!(
                        model = %self.config.model,
                        attempt = attempt,
                        backoff_secs = backoff.as_secs(),
                        "Retrying completion after failure"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PhronesisError::Internal("retry loop without error".to_string())))
    }
}
