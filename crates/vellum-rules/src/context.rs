use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use vellum_world::{Outcome, WorldState};

/// Ordered set of field effects produced by rule hits
///
/// Keys address world fields by dotted path (`resources.wood`,
/// `phenology.season`, `characters.<id>.mode`, `characters.<id>.attr.<k>`).
/// Merging is last-write-wins per field under the engine's stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectSet {
    fields: BTreeMap<String, serde_json::Value>,
}

impl EffectSet {
    /// Create an empty effect set
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Build an effect set from an iterator of (field, value) pairs
    pub fn from_fields(
        fields: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Set one field, replacing any previous value
    pub fn set(&mut self, field: impl Into<String>, value: serde_json::Value) {
        let _ = self.fields.insert(field.into(), value);
    }

    /// Read a field
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Merge `other` into self, later writer wins per field
    pub fn merge(&mut self, other: &EffectSet) {
        for (field, value) in &other.fields {
            let _ = self.fields.insert(field.clone(), value.clone());
        }
    }

    /// Iterate fields in stable order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.fields.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Immutable context a rule evaluates against
///
/// The world snapshot is shared and never mutated; rules express change
/// exclusively through returned effects. `outcome` is present only in
/// the apply phase, when the engine folds a DM outcome into the world.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// World snapshot under evaluation
    pub world: &'a WorldState,
    /// Tick this evaluation belongs to
    pub tick: u64,
    /// Sub-seed handle for rules that need deterministic randomness
    pub seed: u64,
    /// The adjudicated outcome being applied, if any
    pub outcome: Option<&'a Outcome>,
}

impl<'a> RuleContext<'a> {
    /// Context for a pre-pass or poll with no outcome in flight
    pub fn environmental(world: &'a WorldState, tick: u64, seed: u64) -> Self {
        Self {
            world,
            tick,
            seed,
            outcome: None,
        }
    }

    /// Context for applying an adjudicated outcome
    pub fn applying(
        world: &'a WorldState,
        tick: u64,
        seed: u64,
        outcome: &'a Outcome,
    ) -> Self {
        Self {
            world,
            tick,
            seed,
            outcome: Some(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_last_write_wins() {
        let mut first = EffectSet::new();
        first.set("resources.wood", serde_json::json!(5));
        first.set("resources.stone", serde_json::json!(2));

        let mut second = EffectSet::new();
        second.set("resources.wood", serde_json::json!(9));

        first.merge(&second);
        assert_eq!(first.get("resources.wood"), Some(&serde_json::json!(9)));
        assert_eq!(first.get("resources.stone"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let mut effects = EffectSet::new();
        effects.set("b", serde_json::json!(2));
        effects.set("a", serde_json::json!(1));

        let keys: Vec<&str> = effects.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
