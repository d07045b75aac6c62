use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::schema::ResponseSchema;

/// A single completion request
///
/// Providers receive the full request and must not read any other
/// state; the correlation id ties log lines, retries and event records
/// together across the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model name, vendor-specific
    pub model: String,
    /// System prompt
    pub system_prompt: String,
    /// User prompt
    pub user_prompt: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Completion token cap
    pub max_tokens: u32,
    /// Opaque correlation id threaded through logs and events
    pub correlation_id: String,
}

/// Token accounting for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens in the completion
    pub completion_tokens: u64,
    /// Prompt + completion
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build usage from prompt/completion counts
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A single completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Raw completion text
    pub text: String,
    /// Validated structured payload, present after `complete_structured`
    pub structured: Option<serde_json::Value>,
    /// Token accounting as reported by the vendor
    pub usage: TokenUsage,
    /// Provider that produced the response
    pub provider_id: String,
    /// Observed round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Result of a provider health probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderHealth {
    /// Provider answered the probe
    Healthy {
        /// Probe round-trip in milliseconds
        latency_ms: u64,
    },
    /// Provider failed the probe; the error is carried, not raised
    Unhealthy {
        /// Failure detail
        reason: String,
    },
}

impl ProviderHealth {
    /// Whether the probe succeeded
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProviderHealth::Healthy { .. })
    }
}

/// Uniform async surface every LLM vendor plugs in behind
///
/// Implementations are shared by id with lifetime equal to the router;
/// all operations take `&self` and must be safe to call concurrently.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable provider id used for registry lookup and event records
    fn id(&self) -> &str;

    /// Probe the provider for liveness
    async fn health_check(&self) -> Result<ProviderHealth, ProviderError>;

    /// Free-text completion
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Completion validated against one of the fixed response schemas
    ///
    /// Validation failures surface as `ProviderError::Validation` and
    /// never as transport errors.
    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: ResponseSchema,
    ) -> Result<CompletionResponse, ProviderError>;
}
