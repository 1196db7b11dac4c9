//! OpenAI-compatible chat completion client.
//!
//! One worker is bound to one API key; the connection pool holds several of
//! them and hands one out per request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::ChatModel;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::memory::Message;

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl LlmSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: Duration::from_secs(config.request_timeout_seconds.max(1)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct LLMWorker {
    settings: LlmSettings,
    api_key: String,
    http_client: reqwest::Client,
}

impl LLMWorker {
    pub fn new(settings: LlmSettings, api_key: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_default();
        Self {
            settings,
            api_key: api_key.into(),
            http_client,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.settings.base_url)
    }
}

#[async_trait]
impl ChatModel for LLMWorker {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        debug!("LLM worker sending {} message(s) to {}", messages.len(), self.settings.model);
        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: false,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Backend(format!("LLM backend request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let body = match retry_after {
                Some(secs) => format!("{} (retry after {}s)", body, secs),
                None => body,
            };
            return Err(GatewayError::from_status("LLM backend", status, &body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Backend(format!("Failed to parse LLM response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}
