use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmProvider, LlmRequest, LlmResponse, UsageMetadata};

/// Chat-completions client for OpenAI-compatible endpoints (OpenRouter and friends)
pub struct RemoteLlmProvider {
    endpoint: String,
    api_key: String,
    model: String,
    defaults: Sampling,
    extra_headers: Vec<(String, String)>,
    client: reqwest::Client,
}

/// Per-request settings used when the request leaves them unset
#[derive(Debug, Clone, Copy)]
struct Sampling {
    timeout: Duration,
    max_tokens: usize,
    temperature: f32,
}

impl RemoteLlmProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            defaults: Sampling {
                timeout: Duration::from_secs(30),
                max_tokens: 2048,
                temperature: 0.3,
            },
            extra_headers: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_defaults(mut self, timeout_secs: u64, max_tokens: usize, temperature: f32) -> Self {
        self.defaults = Sampling {
            timeout: Duration::from_secs(timeout_secs),
            max_tokens,
            temperature,
        };
        self
    }

    /// Extra header sent with every request (e.g. `HTTP-Referer`, `X-Title`).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, body: &ChatBody<'_>) -> Result<ChatReply> {
        let mut builder = self.client.post(&self.endpoint).bearer_auth(&self.api_key);
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.json(body).send().await.context("LLM HTTP request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, text);
        }
        response.json().await.context("Failed to parse LLM response")
    }
}

#[async_trait::async_trait]
impl LlmProvider for RemoteLlmProvider {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        let timeout = request
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.defaults.timeout);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: &request.prompt });

        let body = ChatBody {
            model: &self.model,
            messages,
            response_format: request.json_mode.then_some(ResponseFormat { kind: "json_object" }),
            max_tokens: request.max_tokens.unwrap_or(self.defaults.max_tokens),
            temperature: request.temperature.unwrap_or(self.defaults.temperature),
        };

        // one deadline covers connect, headers and body
        let reply = tokio::time::timeout(timeout, self.post(&body))
            .await
            .with_context(|| format!("LLM request timed out after {:?}", timeout))??;

        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("LLM response has no choices")?;

        Ok(LlmResponse {
            content,
            usage: UsageMetadata {
                prompt_tokens: reply.usage.prompt_tokens,
                completion_tokens: reply.usage.completion_tokens,
                total_tokens: reply.usage.total_tokens,
            },
            model: reply.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: Option<String>,
    choices: Vec<ReplyChoice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct ReplyChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}
