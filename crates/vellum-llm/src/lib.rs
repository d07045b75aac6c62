//! LLM provider abstraction for the VELLUM narrative engine
//!
//! Every model call in the kernel flows through the [`LlmProvider`]
//! trait and the [`ProviderRouter`]: a uniform async request/response
//! surface with structured-output validation, a closed error taxonomy,
//! and concurrent health checks. Concrete vendors (OpenAI, Anthropic,
//! Ollama) live behind the trait; the kernel never branches on
//! provider identity.

/// Closed provider error taxonomy
pub mod error;

/// Request/response shapes and the provider trait
pub mod provider;

/// Structured response schemas and validation
pub mod schema;

/// Provider registry and dispatch
pub mod router;

/// Concrete vendor providers
pub mod providers;

/// Re-export commonly used types
pub use error::ProviderError;
pub use provider::{
    CompletionRequest, CompletionResponse, LlmProvider, ProviderHealth, TokenUsage,
};
pub use providers::{build_provider, ProviderKind, ProviderSettings};
pub use router::ProviderRouter;
pub use schema::{DecisionPayload, IntentPayload, ResponseSchema};
