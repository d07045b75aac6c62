//! Parallel solicitation must not leak completion order into the log

mod common;

use std::time::Duration;

use common::{test_narrator, ScriptedProvider};

use vellum_world::{Character, StateMode, WorldState};

#[tokio::test(flavor = "multi_thread")]
async fn commit_order_is_character_id_order_not_completion_order() {
    // alpha answers slowly, beta instantly
    let provider = ScriptedProvider::new(
        "stub",
        Box::new(|_request| serde_json::json!({ "action": "wait", "parameters": {} })),
    )
    .with_latency(Box::new(|request| {
        if request.correlation_id.contains("char:alpha") {
            Duration::from_millis(120)
        } else {
            Duration::from_millis(1)
        }
    }));

    let world = WorldState::new(0)
        .with_character(Character::new("alpha", StateMode::Active))
        .with_character(Character::new("beta", StateMode::Active));

    let (mut narrator, sink) = test_narrator(provider, 1, world);
    narrator.run_tick().await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].character_id.as_str(), "alpha");
    assert_eq!(records[1].character_id.as_str(), "beta");
}

#[tokio::test(flavor = "multi_thread")]
async fn passive_and_dormant_characters_skip_the_llm_path() {
    let provider = ScriptedProvider::new(
        "stub",
        Box::new(|_request| serde_json::json!({ "action": "wait", "parameters": {} })),
    );

    let world = WorldState::new(0)
        .with_character(Character::new("active-one", StateMode::Active))
        .with_character(Character::new("keeper", StateMode::Passive))
        .with_character(Character::new("sleeper", StateMode::Dormant));

    let (mut narrator, sink) = test_narrator(provider, 1, world);
    narrator.run_tick().await.unwrap();

    // Only the active character produced an event
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].character_id.as_str(), "active-one");

    // The others still advanced in time with the world
    assert_eq!(narrator.world().tick, 1);
    assert_eq!(narrator.world().characters.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn ticks_are_strictly_ordered_across_the_log() {
    let provider = ScriptedProvider::new(
        "stub",
        Box::new(|_request| serde_json::json!({ "action": "wait", "parameters": {} })),
    );

    let world = WorldState::new(0)
        .with_character(Character::new("alpha", StateMode::Active))
        .with_character(Character::new("beta", StateMode::Active));

    let (mut narrator, sink) = test_narrator(provider, 1, world);
    for _ in 0..4 {
        narrator.run_tick().await.unwrap();
    }

    let records = sink.records();
    assert_eq!(records.len(), 8);
    for pair in records.windows(2) {
        assert!(pair[0].tick <= pair[1].tick);
    }
}
