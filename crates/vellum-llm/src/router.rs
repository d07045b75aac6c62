use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::error::ProviderError;
use super::provider::{CompletionRequest, CompletionResponse, LlmProvider, ProviderHealth};
use super::schema::ResponseSchema;

/// Registry of providers with a current default
///
/// The registry is read-mostly: registration and default selection are
/// expected at startup or administrative reconfiguration, so a single
/// `RwLock` over the map is the whole locking discipline. Dispatch
/// clones the `Arc` out of the map and never holds the lock across a
/// provider call.
///
/// The router does not implement fallback or load balancing; failover
/// is the narrator's responsibility via explicit retry.
#[derive(Default)]
pub struct ProviderRouter {
    inner: RwLock<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
}

impl ProviderRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a provider by id
    ///
    /// The first registered provider becomes the default until
    /// `set_default` selects another.
    pub fn register(&self, provider: Arc<dyn LlmProvider>) {
        let id = provider.id().to_string();
        let mut inner = self.inner.write();
        if inner.default_id.is_none() {
            inner.default_id = Some(id.clone());
        }
        let replaced = inner.providers.insert(id.clone(), provider).is_some();
        info!(provider_id = %id, replaced, "provider registered");
    }

    /// Select the primary provider
    pub fn set_default(&self, id: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.write();
        if !inner.providers.contains_key(id) {
            return Err(ProviderError::Other {
                provider_id: id.to_string(),
                reason: "cannot set default: provider not registered".to_string(),
            });
        }
        inner.default_id = Some(id.to_string());
        Ok(())
    }

    /// Id of the current default provider
    pub fn default_id(&self) -> Option<String> {
        self.inner.read().default_id.clone()
    }

    /// Registered provider ids in stable order
    pub fn provider_ids(&self) -> Vec<String> {
        self.inner.read().providers.keys().cloned().collect()
    }

    /// Look up a provider handle by id, or the default when `None`
    pub fn provider(&self, id: Option<&str>) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let inner = self.inner.read();
        let id = match id {
            Some(id) => id.to_string(),
            None => inner.default_id.clone().ok_or_else(|| ProviderError::Other {
                provider_id: "<default>".to_string(),
                reason: "no default provider configured".to_string(),
            })?,
        };
        inner
            .providers
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::Other {
                provider_id: id,
                reason: "provider not registered".to_string(),
            })
    }

    /// Dispatch a free-text completion to the named or default provider
    pub async fn complete(
        &self,
        provider_id: Option<&str>,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let provider = self.provider(provider_id)?;
        provider.complete(request).await
    }

    /// Dispatch a structured completion to the named or default provider
    pub async fn complete_structured(
        &self,
        provider_id: Option<&str>,
        request: &CompletionRequest,
        schema: ResponseSchema,
    ) -> Result<CompletionResponse, ProviderError> {
        let provider = self.provider(provider_id)?;
        provider.complete_structured(request, schema).await
    }

    /// Probe every registered provider concurrently
    ///
    /// A single provider's failure is recorded in its entry and never
    /// fails the fan-out.
    pub async fn health_check_all(&self) -> BTreeMap<String, ProviderHealth> {
        let providers: Vec<Arc<dyn LlmProvider>> =
            self.inner.read().providers.values().cloned().collect();

        let probes = providers.iter().map(|provider| async move {
            let id = provider.id().to_string();
            let health = match provider.health_check().await {
                Ok(health) => health,
                Err(e) => {
                    warn!(provider_id = %id, error = %e, "health check failed");
                    ProviderHealth::Unhealthy {
                        reason: e.to_string(),
                    }
                }
            };
            (id, health)
        });

        join_all(probes).await.into_iter().collect()
    }
}
