//! LLM API HTTP Client
//!
//! Supports OpenAI-compatible chat completions and the Anthropic messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, GatewayError, Result};

use super::gateway::CompletionGateway;
use super::types::*;

/// Completion API client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: LlmProvider,
    max_tokens: Option<u64>,
    timeout: Duration,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        let base_url = match &config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match config.provider {
                LlmProvider::OpenAi => "https://api.openai.com/v1".to_string(),
                LlmProvider::Claude => "https://api.anthropic.com/v1".to_string(),
            },
        };

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url,
            provider: config.provider.clone(),
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    /// Create with custom base URL (for testing or custom endpoints)
    pub fn with_base_url(config: &LlmConfig, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(client)
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the provider type
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::from(e)
        }
    }

    /// Send request to an OpenAI-compatible API
    async fn send_openai_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!("Sending request to OpenAI-compatible API: {}", url);

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!("OpenAI API error: {} - {}", status, body);
            return Err(classify_status(status, body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            GatewayError::MalformedResponse(format!("Failed to parse response: {} - {}", e, body))
        })?;

        info!(
            "OpenAI API response: finish_reason={:?}, tokens={}",
            parsed.choices.first().and_then(|c| c.finish_reason.as_deref()),
            parsed.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0)
        );

        parsed
            .reply_text()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::MalformedResponse("response has no message content".to_string()))
    }

    /// Send request to the Anthropic messages API
    async fn send_claude_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, GatewayError> {
        let url = format!("{}/messages", self.base_url);

        debug!("Sending request to Claude API: {}", url);

        let request = MessagesRequest::from_prompt(model, messages, self.max_tokens);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!("Claude API error: {} - {}", status, body);
            return Err(classify_status(status, body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| {
            GatewayError::MalformedResponse(format!("Failed to parse response: {} - {}", e, body))
        })?;

        info!(
            "Claude API response: stop_reason={:?}, tokens={}",
            parsed.stop_reason,
            parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0)
        );

        Ok(parsed.reply_text())
    }
}

#[async_trait]
impl CompletionGateway for LlmClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, GatewayError> {
        // Checked per call: a missing key is not a startup error
        if self.api_key.is_empty() {
            return Err(GatewayError::MissingApiKey);
        }

        match self.provider {
            LlmProvider::OpenAi => self.send_openai_request(model, messages).await,
            LlmProvider::Claude => self.send_claude_request(model, messages).await,
        }
    }
}

/// Map a non-success HTTP status to a gateway failure kind
fn classify_status(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GatewayError::Auth(format!("{}: {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited(body),
        _ => GatewayError::Upstream {
            status: status.as_u16(),
            body,
        },
    }
}
