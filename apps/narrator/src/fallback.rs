//! Static fallback policy
//!
//! When every retry for a character is rejected, the narrator commits a
//! safe intent drawn from this table instead of inventing one in code.
//! Keeping the policy as data keeps the tick loop free of special cases
//! and preserves replay determinism.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use vellum_world::{Character, CharacterId, Intent, StateMode};

/// A safe intent template, instantiated per character at commit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackIntent {
    /// Action name; drawn from the known-safe subset
    pub action: String,
    /// Fixed parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Canned flavor text
    #[serde(default)]
    pub flavor_text: String,
}

/// Mapping from context class to a safe intent
///
/// The context class is derived from the character's state; unknown
/// classes fall through to `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackPolicy {
    entries: BTreeMap<String, FallbackIntent>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        let _ = entries.insert(
            "default".to_string(),
            FallbackIntent {
                action: "wait".to_string(),
                parameters: BTreeMap::new(),
                flavor_text: "They pause, letting the moment pass.".to_string(),
            },
        );
        let _ = entries.insert(
            "passive".to_string(),
            FallbackIntent {
                action: "idle".to_string(),
                parameters: BTreeMap::new(),
                flavor_text: "They keep to their routine.".to_string(),
            },
        );
        Self { entries }
    }
}

impl FallbackPolicy {
    /// Build a policy from explicit entries; `default` must be present
    pub fn new(entries: BTreeMap<String, FallbackIntent>) -> Option<Self> {
        entries
            .contains_key("default")
            .then_some(Self { entries })
    }

    /// Context class for a character
    ///
    /// Minimal classification: the state mode's name. The table can be
    /// extended without touching the tick loop.
    pub fn classify(character: &Character) -> &'static str {
        match character.mode {
            StateMode::Active => "default",
            StateMode::Passive => "passive",
            StateMode::Dormant => "dormant",
        }
    }

    /// Synthesize the fallback intent for a character
    ///
    /// Fallback intents skip the whitelist; they come from this table's
    /// known-safe subset. The attempt index records how many solicited
    /// attempts preceded the fallback.
    pub fn intent_for(&self, character: &Character, attempt: u32) -> Intent {
        let class = Self::classify(character);
        let template = self
            .entries
            .get(class)
            .or_else(|| self.entries.get("default"));

        match template {
            Some(t) => Intent {
                action: t.action.clone(),
                parameters: t.parameters.clone(),
                flavor_text: t.flavor_text.clone(),
                author: character.id.clone(),
                attempt,
            },
            // Unreachable with a constructed policy; still total
            None => Intent::new("wait", CharacterId::from(character.id.as_str()), attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_waits() {
        let policy = FallbackPolicy::default();
        let gwen = Character::new("gwen", StateMode::Active);

        let intent = policy.intent_for(&gwen, 3);
        assert_eq!(intent.action, "wait");
        assert_eq!(intent.attempt, 3);
        assert_eq!(intent.author.as_str(), "gwen");
    }

    #[test]
    fn test_unknown_class_falls_through_to_default() {
        let policy = FallbackPolicy::default();
        let sleeper = Character::new("ash", StateMode::Dormant);

        // No "dormant" entry in the default table
        let intent = policy.intent_for(&sleeper, 0);
        assert_eq!(intent.action, "wait");
    }

    #[test]
    fn test_policy_requires_default_entry() {
        let mut entries = BTreeMap::new();
        let _ = entries.insert(
            "passive".to_string(),
            FallbackIntent {
                action: "idle".to_string(),
                parameters: BTreeMap::new(),
                flavor_text: String::new(),
            },
        );
        assert!(FallbackPolicy::new(entries).is_none());
    }
}
