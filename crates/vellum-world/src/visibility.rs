use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Character, CharacterId, StateMode, WorldState};

/// Explicit grants controlling what a character may see
///
/// The scope is authorization-only: facts outside it never enter the
/// character's LLM context. Construction of a view is deterministic
/// given the world snapshot, so replays build byte-identical contexts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityScope {
    /// Characters whose presence and mode this character may observe
    #[serde(default)]
    pub peers: BTreeSet<CharacterId>,
    /// Resource keys visible by prefix match
    #[serde(default)]
    pub resource_prefixes: BTreeSet<String>,
    /// Whether the phenology vector is visible
    #[serde(default)]
    pub phenology: bool,
}

impl VisibilityScope {
    /// Scope that sees nothing beyond the character itself
    pub fn closed() -> Self {
        Self::default()
    }

    /// Grant observation of a peer
    pub fn with_peer(mut self, peer: CharacterId) -> Self {
        let _ = self.peers.insert(peer);
        self
    }

    /// Grant visibility of resources under a key prefix
    pub fn with_resource_prefix(mut self, prefix: impl Into<String>) -> Self {
        let _ = self.resource_prefixes.insert(prefix.into());
        self
    }

    /// Grant visibility of the phenology vector
    pub fn with_phenology(mut self) -> Self {
        self.phenology = true;
        self
    }
}

/// A peer as seen through another character's scope
///
/// Deliberately thin: presence and mode only, no attribute disclosure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisiblePeer {
    /// Peer id
    pub id: CharacterId,
    /// Peer state mode
    pub mode: StateMode,
}

/// The deterministic, authorization-filtered view handed to the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterView {
    /// Tick of the underlying snapshot
    pub tick: u64,
    /// The viewing character's own id
    pub character_id: CharacterId,
    /// The viewing character's own attributes
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Peers visible under the scope, in id order
    pub peers: Vec<VisiblePeer>,
    /// Resources visible under the scope, in key order
    pub resources: BTreeMap<String, i64>,
    /// Phenology vector, present only when granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phenology: Option<BTreeMap<String, f64>>,
}

impl CharacterView {
    /// Build the scoped view of `world` for `character`
    ///
    /// Pure function of (snapshot, character); all collections keep
    /// `BTreeMap`/`BTreeSet` ordering so two runs produce identical
    /// views byte for byte.
    pub fn scoped(world: &WorldState, character: &Character) -> Self {
        let scope = &character.visibility;

        let peers = world
            .characters
            .values()
            .filter(|peer| peer.id != character.id && scope.peers.contains(&peer.id))
            .map(|peer| VisiblePeer {
                id: peer.id.clone(),
                mode: peer.mode,
            })
            .collect();

        let resources = world
            .resources
            .iter()
            .filter(|(key, _)| {
                scope
                    .resource_prefixes
                    .iter()
                    .any(|prefix| key.starts_with(prefix.as_str()))
            })
            .map(|(key, amount)| (key.clone(), *amount))
            .collect();

        let phenology = scope.phenology.then(|| world.phenology.clone());

        Self {
            tick: world.tick,
            character_id: character.id.clone(),
            attributes: character.attributes.clone(),
            peers,
            resources,
            phenology,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_scoped_gwen() -> WorldState {
        let gwen = Character {
            visibility: VisibilityScope::closed()
                .with_peer(CharacterId::from("bran"))
                .with_resource_prefix("field.")
                .with_phenology(),
            ..Character::new("gwen", StateMode::Active)
        };

        WorldState::new(5)
            .with_character(gwen)
            .with_character(Character::new("bran", StateMode::Passive))
            .with_character(Character::new("mara", StateMode::Active))
            .with_resource("field.wheat", 40)
            .with_resource("vault.gold", 900)
            .with_phenology("season", 0.25)
    }

    #[test]
    fn test_view_discloses_only_granted_facts() {
        let world = world_with_scoped_gwen();
        let gwen = &world.characters[&CharacterId::from("gwen")];
        let view = CharacterView::scoped(&world, gwen);

        // bran is granted, mara is not
        assert_eq!(view.peers.len(), 1);
        assert_eq!(view.peers[0].id.as_str(), "bran");

        // only the field.* prefix is visible
        assert_eq!(view.resources.len(), 1);
        assert!(view.resources.contains_key("field.wheat"));

        assert!(view.phenology.is_some());
        assert_eq!(view.tick, 5);
    }

    #[test]
    fn test_closed_scope_sees_nothing() {
        let world = world_with_scoped_gwen();
        let mara = &world.characters[&CharacterId::from("mara")];
        let view = CharacterView::scoped(&world, mara);

        assert!(view.peers.is_empty());
        assert!(view.resources.is_empty());
        assert!(view.phenology.is_none());
    }

    #[test]
    fn test_view_construction_is_deterministic() {
        let world = world_with_scoped_gwen();
        let gwen = &world.characters[&CharacterId::from("gwen")];

        let a = serde_json::to_vec(&CharacterView::scoped(&world, gwen)).unwrap();
        let b = serde_json::to_vec(&CharacterView::scoped(&world, gwen)).unwrap();
        assert_eq!(a, b);
    }
}
