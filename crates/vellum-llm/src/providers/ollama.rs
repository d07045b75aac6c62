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

/// Ollama generate provider for local models
pub struct OllamaProvider {
    id: String,
    settings: ProviderSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequestBody<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaProvider {
    /// Build a provider from transport settings
    ///
    /// Ollama needs no API key; one configured anyway is ignored.
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

    async fn generate(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = GenerateRequestBody {
            model: self.model(request),
            system: &request.system_prompt,
            prompt: &request.user_prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.settings.endpoint);

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&body)
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

        let parsed: GenerateResponseBody =
            serde_json::from_str(&text).map_err(|e| ProviderError::Other {
                provider_id: self.id.clone(),
                reason: format!("malformed generate response: {e}"),
            })?;

        debug!(
            provider_id = %self.id,
            correlation_id = %request.correlation_id,
            latency_ms,
            "generate completion finished"
        );

        Ok(CompletionResponse {
            text: parsed.response,
            structured: None,
            usage: TokenUsage::new(parsed.prompt_eval_count, parsed.eval_count),
            provider_id: self.id.clone(),
            latency_ms,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let url = format!("{}/api/tags", self.settings.endpoint);

        let started = Instant::now();
        let response = self
            .client
            .get(&url)
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
        self.generate(request).await
    }

    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: ResponseSchema,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut shaped = request.clone();
        shaped.system_prompt = structured_system_prompt(&request.system_prompt, schema);

        let mut response = self.generate(&shaped).await?;
        let value = schema.parse(&self.id, &response.text)?;
        response.structured = Some(value);
        Ok(response)
    }
}
