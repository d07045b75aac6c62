use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::visibility::VisibilityScope;

/// Stable character identifier
///
/// Commit order within a tick is the lexicographic order of these ids,
/// so they double as the deterministic sort key for fan-out collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    /// View as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CharacterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Execution-cost class for a character
///
/// Determines which path a character takes through the tick: only
/// `Active` characters reach the LLM; `Passive` characters receive
/// rule-only updates; `Dormant` characters advance in time only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateMode {
    Active,
    Passive,
    Dormant,
}

/// Immutable character value object
///
/// A character is created at world seed; its state mode may change each
/// tick through rule outcomes, expressed by producing a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Stable unique id
    pub id: CharacterId,
    /// Execution-cost class for this tick
    pub mode: StateMode,
    /// Free-form attribute bag, deterministically ordered
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Facts this character is authorized to see
    pub visibility: VisibilityScope,
}

impl Character {
    /// Create a character with an empty attribute bag and closed scope
    pub fn new(id: impl Into<String>, mode: StateMode) -> Self {
        Self {
            id: CharacterId(id.into()),
            mode,
            attributes: BTreeMap::new(),
            visibility: VisibilityScope::default(),
        }
    }

    /// New version of this character with a different state mode
    pub fn with_mode(&self, mode: StateMode) -> Self {
        let mut next = self.clone();
        next.mode = mode;
        next
    }

    /// New version of this character with one attribute replaced
    pub fn with_attribute(&self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut next = self.clone();
        let _ = next.attributes.insert(key.into(), value);
        next
    }
}

/// Immutable world snapshot, produced once per tick
///
/// All collections are `BTreeMap`s so iteration order, serialization and
/// hashing are stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Tick at which this snapshot was produced
    pub tick: u64,
    /// Phenology vector (season index, daylight, bloom, ...)
    pub phenology: BTreeMap<String, f64>,
    /// World resource table
    pub resources: BTreeMap<String, i64>,
    /// All characters keyed by id
    pub characters: BTreeMap<CharacterId, Character>,
}

impl WorldState {
    /// Create an empty world at a given tick
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            phenology: BTreeMap::new(),
            resources: BTreeMap::new(),
            characters: BTreeMap::new(),
        }
    }

    /// New snapshot advanced to `tick`, otherwise identical
    pub fn at_tick(&self, tick: u64) -> Self {
        let mut next = self.clone();
        next.tick = tick;
        next
    }

    /// New snapshot with a character inserted or replaced
    pub fn with_character(&self, character: Character) -> Self {
        let mut next = self.clone();
        let _ = next.characters.insert(character.id.clone(), character);
        next
    }

    /// New snapshot with one resource entry replaced
    pub fn with_resource(&self, key: impl Into<String>, amount: i64) -> Self {
        let mut next = self.clone();
        let _ = next.resources.insert(key.into(), amount);
        next
    }

    /// New snapshot with one phenology entry replaced
    pub fn with_phenology(&self, key: impl Into<String>, value: f64) -> Self {
        let mut next = self.clone();
        let _ = next.phenology.insert(key.into(), value);
        next
    }

    /// Characters in a given state mode, in id order
    pub fn characters_in_mode(&self, mode: StateMode) -> Vec<&Character> {
        self.characters
            .values()
            .filter(|c| c.mode == mode)
            .collect()
    }
}
