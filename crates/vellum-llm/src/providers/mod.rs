//! Concrete vendor providers
//!
//! Each vendor hides its HTTP contract behind [`crate::LlmProvider`].
//! New vendors are added by extending [`ProviderKind`] and this module;
//! nothing outside it ever branches on provider identity.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Tagged vendor variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions contract
    Openai,
    /// Anthropic messages contract
    Anthropic,
    /// Ollama generate contract
    Ollama,
}

/// Transport settings shared by every vendor
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Base endpoint, without a trailing slash
    pub endpoint: String,
    /// Default model when a request does not name one
    pub model: String,
    /// API key, if the vendor requires one
    pub api_key: Option<String>,
    /// Per-request transport timeout
    pub timeout: Duration,
}

/// Construct a provider of the given kind behind the trait object
pub fn build_provider(
    kind: ProviderKind,
    id: &str,
    settings: ProviderSettings,
) -> Result<std::sync::Arc<dyn crate::LlmProvider>, ProviderError> {
    Ok(match kind {
        ProviderKind::Openai => std::sync::Arc::new(OpenAiProvider::new(id, settings)?),
        ProviderKind::Anthropic => std::sync::Arc::new(AnthropicProvider::new(id, settings)?),
        ProviderKind::Ollama => std::sync::Arc::new(OllamaProvider::new(id, settings)?),
    })
}

/// Build the shared HTTP client for a provider
pub(crate) fn http_client(
    provider_id: &str,
    timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("vellum/0.1")
        .build()
        .map_err(|e| ProviderError::Other {
            provider_id: provider_id.to_string(),
            reason: format!("failed to build http client: {e}"),
        })
}

/// Map a reqwest transport failure onto the closed taxonomy
pub(crate) fn transport_error(provider_id: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() {
        ProviderError::Unavailable {
            provider_id: provider_id.to_string(),
            reason: error.to_string(),
        }
    } else {
        ProviderError::Other {
            provider_id: provider_id.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Map a non-success HTTP status onto the closed taxonomy
///
/// Auth and rate-limit statuses are unavailability; everything else is
/// a recoverable provider error.
pub(crate) fn status_error(
    provider_id: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> ProviderError {
    let reason = format!("http {status}: {}", body.chars().take(200).collect::<String>());
    match status.as_u16() {
        401 | 403 | 429 | 502 | 503 | 504 => ProviderError::Unavailable {
            provider_id: provider_id.to_string(),
            reason,
        },
        _ => ProviderError::Other {
            provider_id: provider_id.to_string(),
            reason,
        },
    }
}

/// Compose the structured-output system prompt
pub(crate) fn structured_system_prompt(base: &str, schema: crate::ResponseSchema) -> String {
    format!(
        "{base}\n\nRespond with a single JSON object, no surrounding prose, matching exactly:\n{}",
        schema.describe()
    )
}
