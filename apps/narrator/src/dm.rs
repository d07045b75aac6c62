//! Stateless DM resolution
//!
//! The DM is a thin wrapper over the provider router with a fixed
//! decision prompt and schema. No prior call influences the current
//! one: everything the DM sees is in the explicit package, and the
//! package is byte-stable given identical inputs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use vellum_llm::{
    CompletionRequest, DecisionPayload, ProviderError, ProviderRouter, ResponseSchema, TokenUsage,
};
use vellum_world::hashing;
use vellum_world::{Character, Intent, Outcome, ReasonCode, Verdict, WorldState};

const DM_SYSTEM_PROMPT: &str = "You are the dungeon master of a deterministic narrative \
simulation. You receive one adjudication package: a character snapshot, a world snapshot, \
the committed intent, and a resolution seed. Decide whether the intent succeeds and what \
changes. World fields you may write: resources.<key> (integer), phenology.<key> (number), \
characters.<id>.mode (ACTIVE|PASSIVE|DORMANT), characters.<id>.attr.<key> (any value).";

/// Deterministically packaged input for one DM resolution
///
/// Byte-stable: every collection inside is ordered, so two runs with
/// the same inputs serialize to identical bytes and identical digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmPackage {
    /// Tick of the resolution
    pub tick: u64,
    /// Snapshot of the acting character
    pub character: Character,
    /// Snapshot of the world the intent executes against
    pub world: WorldState,
    /// The committed intent (approved or fallback)
    pub intent: Intent,
    /// Digest of the rule registry in force
    pub rule_snapshot_id: String,
    /// Sub-seed reserved for this resolution
    pub sub_seed: u64,
}

impl DmPackage {
    /// Digest of the package, recorded for replay audits
    pub fn digest(&self) -> Result<String, hashing::HashingError> {
        Ok(hashing::digest_hex(&hashing::value_digest(self)?))
    }
}

/// Result of one DM call
#[derive(Debug, Clone, PartialEq)]
pub struct DmResolution {
    /// The structured outcome
    pub outcome: Outcome,
    /// Tokens spent on the call
    pub usage: TokenUsage,
}

/// Stateless resolver over the router
pub struct DmResolver {
    provider_id: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl DmResolver {
    /// Resolver dispatching to the router's default provider
    pub fn new() -> Self {
        Self {
            provider_id: None,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    /// Pin the resolver to a named provider
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Resolve one package into a structured outcome
    ///
    /// The call is a single `complete_structured` against the decision
    /// schema; token usage is recorded on the resolution.
    pub async fn resolve(
        &self,
        router: &ProviderRouter,
        package: &DmPackage,
    ) -> Result<DmResolution, ProviderError> {
        let provider_id = self.provider_id.as_deref();
        let package_json =
            serde_json::to_string_pretty(package).map_err(|e| ProviderError::Other {
                provider_id: provider_id.unwrap_or("<default>").to_string(),
                reason: format!("package serialization failed: {e}"),
            })?;

        let request = CompletionRequest {
            model: String::new(),
            system_prompt: DM_SYSTEM_PROMPT.to_string(),
            user_prompt: package_json,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            correlation_id: format!(
                "tick:{}:char:{}:resolve",
                package.tick, package.character.id
            ),
        };

        let response = router
            .complete_structured(provider_id, &request, ResponseSchema::DecisionResponse)
            .await?;

        let structured = response.structured.clone().unwrap_or_default();
        let payload: DecisionPayload =
            serde_json::from_value(structured).map_err(|e| ProviderError::Validation {
                provider_id: response.provider_id.clone(),
                reason: format!("decision payload: {e}"),
            })?;

        debug!(
            tick = package.tick,
            character = %package.character.id,
            verdict = %payload.verdict,
            "dm resolved"
        );

        let verdict = if payload.verdict == "APPROVED" {
            Verdict::Approved
        } else {
            Verdict::Rejected {
                reason: ReasonCode::DmRejected,
            }
        };

        Ok(DmResolution {
            outcome: Outcome {
                verdict,
                result: payload.outcome,
                rule_trace: Vec::new(),
                fallback: false,
                fallback_reason: None,
            },
            usage: response.usage,
        })
    }
}

impl Default for DmResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_world::{CharacterId, StateMode};

    fn package() -> DmPackage {
        DmPackage {
            tick: 4,
            character: Character::new("gwen", StateMode::Active),
            world: WorldState::new(4).with_resource("field.wheat", 10),
            intent: Intent::new("wait", CharacterId::from("gwen"), 0),
            rule_snapshot_id: "abc123".to_string(),
            sub_seed: 42,
        }
    }

    #[test]
    fn test_package_digest_is_byte_stable() {
        let a = package().digest().unwrap();
        let b = package().digest().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_package_digest_tracks_content() {
        let base = package();
        let mut changed = package();
        changed.sub_seed = 43;

        assert_ne!(base.digest().unwrap(), changed.digest().unwrap());
    }
}
