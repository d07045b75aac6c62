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

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic messages provider
pub struct AnthropicProvider {
    id: String,
    settings: ProviderSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequestBody<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<UserMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponseBody {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicProvider {
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

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
        match &self.settings.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn messages(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = MessagesRequestBody {
            model: self.model(request),
            system: &request.system_prompt,
            messages: vec![UserMessage {
                role: "user",
                content: &request.user_prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/v1/messages", self.settings.endpoint);
        let http = self.authed(self.client.post(&url)).json(&body);

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

        let parsed: MessagesResponseBody =
            serde_json::from_str(&text).map_err(|e| ProviderError::Other {
                provider_id: self.id.clone(),
                reason: format!("malformed messages response: {e}"),
            })?;

        let content = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        debug!(
            provider_id = %self.id,
            correlation_id = %request.correlation_id,
            latency_ms,
            "messages completion finished"
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
impl LlmProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let url = format!("{}/v1/models", self.settings.endpoint);
        let http = self.authed(self.client.get(&url));

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
        self.messages(request).await
    }

    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: ResponseSchema,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut shaped = request.clone();
        shaped.system_prompt = structured_system_prompt(&request.system_prompt, schema);

        let mut response = self.messages(&shaped).await?;
        let value = schema.parse(&self.id, &response.text)?;
        response.structured = Some(value);
        Ok(response)
    }
}
