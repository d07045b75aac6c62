//! Deterministic genesis world
//!
//! The starting world is a pure function of the root seed: same seed,
//! same characters, same resources, byte for byte. Richer worlds plug
//! in by replacing this module's output before the first tick.

use seed::SeedManager;
use vellum_world::{Character, CharacterId, StateMode, VisibilityScope, WorldState};

/// Build the genesis snapshot for a root seed
///
/// Two active characters and one passive homestead keeper, with scopes
/// that let the actives see each other and the shared fields.
pub fn genesis_world(root_seed: u64, start_tick: u64) -> WorldState {
    let seeds = SeedManager::new(root_seed);

    let wheat = 40 + (seeds.sub_seed("genesis:field.wheat") % 21) as i64;
    let timber = 60 + (seeds.sub_seed("genesis:field.timber") % 31) as i64;

    let gwen = Character {
        visibility: VisibilityScope::closed()
            .with_peer(CharacterId::from("rhos"))
            .with_resource_prefix("field.")
            .with_phenology(),
        ..Character::new("gwen", StateMode::Active)
    }
    .with_attribute("role", serde_json::json!("forager"))
    .with_attribute("vigor", serde_json::json!(seeds.sub_seed("genesis:gwen:vigor") % 100));

    let rhos = Character {
        visibility: VisibilityScope::closed()
            .with_peer(CharacterId::from("gwen"))
            .with_resource_prefix("field.")
            .with_phenology(),
        ..Character::new("rhos", StateMode::Active)
    }
    .with_attribute("role", serde_json::json!("builder"))
    .with_attribute("vigor", serde_json::json!(seeds.sub_seed("genesis:rhos:vigor") % 100));

    let ila = Character {
        visibility: VisibilityScope::closed().with_resource_prefix("hearth."),
        ..Character::new("ila", StateMode::Passive)
    }
    .with_attribute("role", serde_json::json!("keeper"));

    WorldState::new(start_tick)
        .with_character(gwen)
        .with_character(rhos)
        .with_character(ila)
        .with_resource("field.wheat", wheat)
        .with_resource("field.timber", timber)
        .with_resource("hearth.firewood", 12)
        .with_phenology("season", 0.0)
        .with_phenology("daylight", 0.5)
}
