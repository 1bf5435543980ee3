use super::llm::{ChatCompletion, ChatRequest, LlmClient};
use crate::config::LlmConfig;
use crate::tokens::TokenUsage;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// OpenAI-compatible chat client for the DeepSeek API.
///
/// One request per call; retries, fallback and accounting happen in the
/// service layer.
pub struct DeepSeekClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl DeepSeekClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            warn!("DEEPSEEK_API_KEY is not set; AI calls will fail until configured");
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmClient for DeepSeekClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let Some(key) = &self.api_key else {
            return Err(Error::configuration_with_context(
                "DeepSeek API key is not configured",
                ErrorContext::new()
                    .with_field_path("llm.api_key")
                    .with_source("deepseek_client"),
            ));
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "sending chat completion");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| {
                    if text.trim().is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_string()
                    } else {
                        text.clone()
                    }
                });
            return Err(Error::remote(status.as_u16(), message));
        }

        let body: CompletionBody = serde_json::from_str(&text)
            .map_err(|e| Error::parse(format!("invalid response body: {}", e)))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::parse("invalid response: no message content"))?;
        let usage = body.usage.map(|u| {
            let mut usage = TokenUsage::new(u.prompt_tokens, u.completion_tokens);
            if let Some(total) = u.total_tokens {
                usage.total_tokens = total;
            }
            usage
        });
        Ok(ChatCompletion { content, usage })
    }
}
