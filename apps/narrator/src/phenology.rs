//! Built-in environmental rules
//!
//! The environmental pre-pass runs these before any character acts.
//! Content is deliberately small: a season index that drifts with the
//! tick, and regrowth for resources tagged as renewable. Worlds with
//! richer phenology register their own rules alongside these.

use vellum_rules::{EffectSet, FnRule, Rule, RuleOutcome};

/// Ticks per season cycle at day granularity
const SEASON_CYCLE_TICKS: u64 = 360;

/// Season drift rule
///
/// Writes `phenology.season` as a [0, 1) phase of the yearly cycle.
pub fn season_drift() -> Box<dyn Rule> {
    Box::new(FnRule::new("env.season-drift", |ctx, _merged| {
        let phase = (ctx.tick % SEASON_CYCLE_TICKS) as f64 / SEASON_CYCLE_TICKS as f64;
        let mut effects = EffectSet::new();
        effects.set("phenology.season", serde_json::json!(phase));
        Ok(RuleOutcome::Hit(effects))
    }))
}

/// Regrowth rule for renewable resources
///
/// Resources under the `field.` prefix regrow by one unit per tick, up
/// to the cap. Misses when nothing is below the cap.
pub fn field_regrowth(cap: i64) -> Box<dyn Rule> {
    Box::new(FnRule::new("env.field-regrowth", move |ctx, _merged| {
        let mut effects = EffectSet::new();
        for (key, amount) in &ctx.world.resources {
            if key.starts_with("field.") && *amount < cap {
                effects.set(format!("resources.{key}"), serde_json::json!(amount + 1));
            }
        }

        if effects.is_empty() {
            Ok(RuleOutcome::Miss("all fields at capacity".to_string()))
        } else {
            Ok(RuleOutcome::Hit(effects))
        }
    }))
}
