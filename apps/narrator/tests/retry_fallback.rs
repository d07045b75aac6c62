//! Retry and fallback behavior of the adjudication loop

mod common;

use common::{test_narrator, ScriptedProvider};

use vellum_world::{Character, ReasonCode, StateMode, WorldState};

fn lone_active_world() -> WorldState {
    WorldState::new(0).with_character(Character::new("gwen", StateMode::Active))
}

#[tokio::test]
async fn retries_exhaust_into_fallback() {
    // Provider always declares an action outside the whitelist
    let provider = ScriptedProvider::fixed_intent(
        "stub",
        serde_json::json!({
            "action": "fly",
            "parameters": { "to": "the-moon" },
            "flavor_text": "Gwen flaps her arms."
        }),
    );

    let (mut narrator, sink) = test_narrator(provider, 2, lone_active_world());
    narrator.run_tick().await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let event = &records[0];

    // max_retries = 2 gives 3 attempts, all rejected
    assert_eq!(event.attempts.len(), 3);
    assert!(event.attempts.iter().all(|a| !a.verdict.is_approved()));
    assert!(event
        .attempts
        .iter()
        .all(|a| a.verdict.reason() == Some(ReasonCode::UnknownAction)));

    // The committed intent comes from the fallback policy
    assert!(event.final_record.fallback);
    assert_eq!(
        event.final_record.fallback_reason,
        Some(ReasonCode::UnknownAction)
    );
    assert_eq!(event.final_record.intent.action, "wait");

    // One seed label per attempt plus the resolve label
    assert_eq!(event.seed_labels.len(), 4);
    assert_eq!(event.seed_labels[0], "tick:1:char:gwen:attempt:0");
    assert_eq!(event.seed_labels[2], "tick:1:char:gwen:attempt:2");
    assert_eq!(event.seed_labels[3], "tick:1:char:gwen:resolve");
}

#[tokio::test]
async fn first_valid_attempt_short_circuits_retries() {
    let provider = ScriptedProvider::fixed_intent(
        "stub",
        serde_json::json!({
            "action": "move",
            "parameters": { "to": "mill" },
            "flavor_text": "Gwen walks to the mill."
        }),
    );

    let (mut narrator, sink) = test_narrator(provider, 3, lone_active_world());
    narrator.run_tick().await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let event = &records[0];

    assert_eq!(event.attempts.len(), 1);
    assert!(event.attempts[0].verdict.is_approved());
    assert!(!event.final_record.fallback);
    assert_eq!(event.final_record.intent.action, "move");
}

#[tokio::test]
async fn rejected_then_corrected_attempt_is_recorded() {
    // First attempt misses the required parameter, later attempts fix it
    let provider = ScriptedProvider::new(
        "stub",
        Box::new(|request| {
            if request.correlation_id.ends_with("attempt:0") {
                serde_json::json!({ "action": "move", "parameters": {} })
            } else {
                serde_json::json!({ "action": "move", "parameters": { "to": "mill" } })
            }
        }),
    );

    let (mut narrator, sink) = test_narrator(provider, 3, lone_active_world());
    narrator.run_tick().await.unwrap();

    let event = &sink.records()[0];
    assert_eq!(event.attempts.len(), 2);
    assert_eq!(
        event.attempts[0].verdict.reason(),
        Some(ReasonCode::MissingParameter)
    );
    assert!(event.attempts[1].verdict.is_approved());
    assert!(!event.final_record.fallback);
}

#[tokio::test]
async fn retry_bound_holds_for_every_event() {
    let provider = ScriptedProvider::fixed_intent(
        "stub",
        serde_json::json!({ "action": "fly", "parameters": {} }),
    );

    let max_retries = 2u32;
    let (mut narrator, sink) = test_narrator(provider, max_retries, lone_active_world());
    for _ in 0..3 {
        narrator.run_tick().await.unwrap();
    }

    for event in sink.records() {
        assert!(event.attempts.len() <= (max_retries + 1) as usize);
        let last_rejected = event
            .attempts
            .last()
            .map(|a| !a.verdict.is_approved())
            .unwrap_or(false);
        if last_rejected {
            assert!(event.final_record.fallback);
        }
    }
}
