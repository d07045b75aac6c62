use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{
    CompletionRequest, CompletionResponse, LlmProvider, ProviderHealth, TokenUsage,
};
use crate::schema::ResponseSchema;

use super::{
    http_client, status_error, structured_system_prompt, transport_error, ProviderSettings,
};

/// OpenAI chat-completions provider
///
/// Also speaks to any OpenAI-compatible server (vLLM, LM Studio, local
/// gateways) pointed at by the endpoint.
pub struct OpenAiProvider {
    id: String,
    settings: ProviderSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiProvider {
    /// Build a provider from transport settings
    pub fn new(id: &str, settings: ProviderSettings) -> Result<Self, ProviderError> {
        let client = http_client(id, settings.timeout)?;
        Ok(Self {
            id: id.to_string(),
            settings,
            client,
        })
    }

    fn model<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        if request.model.is_empty() {
            &self.settings.model
        } else {
            &request.model
        }
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = ChatRequestBody {
            model: self.model(request),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.settings.endpoint);
        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.settings.api_key {
            http = http.bearer_auth(key);
        }

        let started = Instant::now();
        let response = http
            .send()
            .await
            .map_err(|e| transport_error(&self.id, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&self.id, e))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(status_error(&self.id, status, &text));
        }

        let parsed: ChatResponseBody =
            serde_json::from_str(&text).map_err(|e| ProviderError::Other {
                provider_id: self.id.clone(),
                reason: format!("malformed chat response: {e}"),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Other {
                provider_id: self.id.clone(),
                reason: "chat response had no choices".to_string(),
            })?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        debug!(
            provider_id = %self.id,
            correlation_id = %request.correlation_id,
            latency_ms,
            "chat completion finished"
        );

        Ok(CompletionResponse {
            text: content,
            structured: None,
            usage,
            provider_id: self.id.clone(),
            latency_ms,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let url = format!("{}/models", self.settings.endpoint);
        let mut http = self.client.get(&url);
        if let Some(key) = &self.settings.api_key {
            http = http.bearer_auth(key);
        }

        let started = Instant::now();
        let response = http
            .send()
            .await
            .map_err(|e| transport_error(&self.id, e))?;

        if response.status().is_success() {
            Ok(ProviderHealth::Healthy {
                latency_ms: started.elapsed().as_millis() as u64,
            })
        } else {
            Ok(ProviderHealth::Unhealthy {
                reason: format!("http {}", response.status()),
            })
        }
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.chat(request).await
    }

    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: ResponseSchema,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut shaped = request.clone();
        shaped.system_prompt = structured_system_prompt(&request.system_prompt, schema);

        let mut response = self.chat(&shaped).await?;
        let value = schema.parse(&self.id, &response.text)?;
        response.structured = Some(value);
        Ok(response)
    }
}
