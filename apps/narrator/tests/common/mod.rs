//! Shared test support: scripted providers and a shared in-memory sink

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use vellum_events::{EventLogError, EventRecord, EventSink};
use vellum_llm::{
    CompletionRequest, CompletionResponse, LlmProvider, ProviderError, ProviderHealth,
    ProviderRouter, ResponseSchema, TokenUsage,
};
use vellum_narrator::dm::DmResolver;
use vellum_narrator::fallback::FallbackPolicy;
use vellum_narrator::{Narrator, NarratorOptions};
use vellum_world::{ActionCatalog, GlobalClock, WorldState};

/// Intent payload the scripted provider answers with
pub type IntentScript =
    Box<dyn Fn(&CompletionRequest) -> serde_json::Value + Send + Sync>;

/// Per-request artificial latency
pub type LatencyScript = Box<dyn Fn(&CompletionRequest) -> Duration + Send + Sync>;

/// Deterministic scripted provider for narrator tests
pub struct ScriptedProvider {
    id: String,
    intent: IntentScript,
    latency: Option<LatencyScript>,
}

impl ScriptedProvider {
    pub fn new(id: &str, intent: IntentScript) -> Self {
        Self {
            id: id.to_string(),
            intent,
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: LatencyScript) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Provider that always answers the same intent payload
    pub fn fixed_intent(id: &str, payload: serde_json::Value) -> Self {
        Self::new(id, Box::new(move |_request| payload.clone()))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        Ok(ProviderHealth::Healthy { latency_ms: 0 })
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.complete_structured(request, ResponseSchema::IntentResponse)
            .await
    }

    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: ResponseSchema,
    ) -> Result<CompletionResponse, ProviderError> {
        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(request)).await;
        }

        let value = match schema {
            ResponseSchema::DecisionResponse => serde_json::json!({
                "verdict": "APPROVED",
                "reason": "narratively sound",
                "outcome": {
                    "effects": {},
                    "narration": "The day passes quietly."
                }
            }),
            _ => (self.intent)(request),
        };

        Ok(CompletionResponse {
            text: value.to_string(),
            structured: Some(value),
            usage: TokenUsage::new(10, 5),
            provider_id: self.id.clone(),
            latency_ms: 1,
        })
    }
}

/// Event sink shared between the narrator and the test body
#[derive(Clone, Default)]
pub struct SharedSink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl EventSink for SharedSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), EventLogError> {
        record.validate()?;
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EventLogError> {
        Ok(())
    }
}

/// Catalog used by most scenarios
pub fn test_catalog() -> ActionCatalog {
    ActionCatalog::from_yaml(
        "move:\n  required: [to]\n  optional: [speed]\nwait:\n  required: []\n",
    )
    .unwrap()
}

/// Assemble a narrator over a scripted provider
pub fn test_narrator(
    provider: ScriptedProvider,
    max_retries: u32,
    world: WorldState,
) -> (Narrator, SharedSink) {
    let router = Arc::new(ProviderRouter::new());
    router.register(Arc::new(provider));

    let sink = SharedSink::new();
    let options = NarratorOptions {
        max_retries,
        tick_deadline: Duration::from_secs(5),
        ..NarratorOptions::default()
    };

    let narrator = Narrator::new(
        options,
        GlobalClock::new(0).unwrap(),
        seed::SeedManager::new(0x5eed),
        router,
        test_catalog(),
        FallbackPolicy::default(),
        DmResolver::new(),
        world,
        Box::new(sink.clone()),
    );

    (narrator, sink)
}
