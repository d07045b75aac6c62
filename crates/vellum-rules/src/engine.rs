use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vellum_world::hashing;
use vellum_world::types::{StateMode, WorldState};

use super::context::{EffectSet, RuleContext};

/// Errors raised during rule evaluation or effect application
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule reported a failure; evaluation aborts and propagates
    #[error("rule {rule_id} failed: {reason}")]
    RuleFailed {
        /// Id of the failing rule
        rule_id: String,
        /// Reason reported by the rule
        reason: String,
    },
    /// A merged effect addressed a field that does not exist
    #[error("effect field {field} is not applicable: {reason}")]
    InvalidEffect {
        /// The dotted field path
        field: String,
        /// Why the field could not be applied
        reason: String,
    },
    /// Context digest could not be computed
    #[error(transparent)]
    Hashing(#[from] hashing::HashingError),
}

/// What a single rule reported for one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The rule fired and produced effects
    Hit(EffectSet),
    /// The rule did not fire; the reason is recorded
    Miss(String),
}

/// Audit record for one rule run
///
/// Stable under replay: identical registry and context produce identical
/// record sequences, byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExecutionRecord {
    /// Rule id
    pub rule_id: String,
    /// Whether the rule fired
    pub hit: bool,
    /// Priority the rule was registered with
    pub priority: i32,
    /// Zero-based registration order
    pub registration_order: usize,
    /// Hex digest of the evaluation context
    pub context_digest: String,
    /// Effects the rule produced, or null on miss
    pub effect: Option<EffectSet>,
    /// Miss reason, present iff the rule missed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miss_reason: Option<String>,
}

/// Result of one engine evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEngineResult {
    /// Effects merged in stable order, last-write-wins per field
    pub effects: EffectSet,
    /// One record per rule run, in execution order
    pub records: Vec<RuleExecutionRecord>,
}

impl RuleEngineResult {
    /// Rule ids that hit, in execution order
    pub fn hit_trace(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.hit)
            .map(|r| r.rule_id.clone())
            .collect()
    }

    /// Apply the merged effects to a snapshot, producing the next one
    ///
    /// Recognized field paths:
    /// - `resources.<key>`: integer amount
    /// - `phenology.<key>`: float value
    /// - `characters.<id>.mode`: `ACTIVE` | `PASSIVE` | `DORMANT`
    /// - `characters.<id>.attr.<key>`: arbitrary attribute value
    pub fn apply_to(&self, world: &WorldState) -> Result<WorldState, RuleError> {
        let mut next = world.clone();

        for (field, value) in self.effects.iter() {
            apply_field(&mut next, field, value)?;
        }

        Ok(next)
    }
}

fn apply_field(
    world: &mut WorldState,
    field: &str,
    value: &serde_json::Value,
) -> Result<(), RuleError> {
    let invalid = |reason: &str| RuleError::InvalidEffect {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    if let Some(key) = field.strip_prefix("resources.") {
        let amount = value.as_i64().ok_or_else(|| invalid("expected integer"))?;
        let _ = world.resources.insert(key.to_string(), amount);
        return Ok(());
    }

    if let Some(key) = field.strip_prefix("phenology.") {
        let reading = value.as_f64().ok_or_else(|| invalid("expected number"))?;
        let _ = world.phenology.insert(key.to_string(), reading);
        return Ok(());
    }

    if let Some(rest) = field.strip_prefix("characters.") {
        let (id, attribute) = rest
            .split_once('.')
            .ok_or_else(|| invalid("expected characters.<id>.<field>"))?;
        let character = world
            .characters
            .get(&vellum_world::CharacterId::from(id))
            .ok_or_else(|| invalid("character not found"))?
            .clone();

        let updated = if attribute == "mode" {
            let mode: StateMode = serde_json::from_value(value.clone())
                .map_err(|_| invalid("expected ACTIVE|PASSIVE|DORMANT"))?;
            character.with_mode(mode)
        } else if let Some(key) = attribute.strip_prefix("attr.") {
            character.with_attribute(key, value.clone())
        } else {
            return Err(invalid("unknown character field"));
        };

        *world = world.with_character(updated);
        return Ok(());
    }

    Err(invalid("unknown field root"))
}

/// A world rule evaluated by the engine
///
/// `merged` exposes the accumulator of effects from earlier rules in
/// this evaluation, so later hits can observe what already changed.
pub trait Rule: Send + Sync {
    /// Stable rule id, used in audit records and traces
    fn id(&self) -> &str;

    /// Evaluate against the context and the threaded accumulator
    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        merged: &EffectSet,
    ) -> Result<RuleOutcome, RuleError>;
}

/// Closure-backed rule for tests and built-ins
pub struct FnRule<F> {
    id: String,
    body: F,
}

impl<F> FnRule<F>
where
    F: Fn(&RuleContext<'_>, &EffectSet) -> Result<RuleOutcome, RuleError> + Send + Sync,
{
    /// Wrap a closure as a rule
    pub fn new(id: impl Into<String>, body: F) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

impl<F> Rule for FnRule<F>
where
    F: Fn(&RuleContext<'_>, &EffectSet) -> Result<RuleOutcome, RuleError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        merged: &EffectSet,
    ) -> Result<RuleOutcome, RuleError> {
        (self.body)(ctx, merged)
    }
}

struct Registration {
    rule: Box<dyn Rule>,
    priority: i32,
    tags: BTreeSet<String>,
    index: usize,
}

/// Priority-ordered rule engine
///
/// Rules run sorted by `(-priority, registration_index)`; ties keep
/// registration order. Evaluation threads an accumulator through the
/// run so later hits observe earlier merged effects. A rule error
/// aborts the evaluation and propagates; errors are never swallowed.
#[derive(Default)]
pub struct RuleEngine {
    registry: Vec<Registration>,
}

impl RuleEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self {
            registry: Vec::new(),
        }
    }

    /// Register a rule with default priority 0 and no tags
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.register_with(rule, 0, []);
    }

    /// Register a rule with an explicit priority and tags
    pub fn register_with(
        &mut self,
        rule: Box<dyn Rule>,
        priority: i32,
        tags: impl IntoIterator<Item = &'static str>,
    ) {
        let index = self.registry.len();
        self.registry.push(Registration {
            rule,
            priority,
            tags: tags.into_iter().map(str::to_string).collect(),
            index,
        });
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Stable digest of the registry (ids, priorities, tags, order)
    ///
    /// Identifies the rule set an outcome was resolved under; identical
    /// registries yield identical ids across runs.
    pub fn snapshot_id(&self) -> Result<String, RuleError> {
        let registry: Vec<(&str, i32, &BTreeSet<String>, usize)> = self
            .registry
            .iter()
            .map(|reg| (reg.rule.id(), reg.priority, &reg.tags, reg.index))
            .collect();
        Ok(hashing::digest_hex(&hashing::value_digest(&registry)?))
    }

    /// Evaluate every registered rule against the context
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleEngineResult, RuleError> {
        self.evaluate_filtered(ctx, None)
    }

    /// Evaluate only rules carrying `tag`
    pub fn evaluate_tagged(
        &self,
        ctx: &RuleContext<'_>,
        tag: &str,
    ) -> Result<RuleEngineResult, RuleError> {
        self.evaluate_filtered(ctx, Some(tag))
    }

    fn evaluate_filtered(
        &self,
        ctx: &RuleContext<'_>,
        tag: Option<&str>,
    ) -> Result<RuleEngineResult, RuleError> {
        let context_digest = hashing::digest_hex(&hashing::value_digest(&(
            ctx.tick,
            ctx.seed,
            ctx.world,
            ctx.outcome,
        ))?);

        let mut order: Vec<&Registration> = self
            .registry
            .iter()
            .filter(|reg| tag.map_or(true, |t| reg.tags.contains(t)))
            .collect();
        order.sort_by_key(|reg| (std::cmp::Reverse(reg.priority), reg.index));

        let mut merged = EffectSet::new();
        let mut records = Vec::with_capacity(order.len());

        for reg in order {
            let outcome = reg.rule.evaluate(ctx, &merged)?;

            let (hit, effect, miss_reason) = match outcome {
                RuleOutcome::Hit(effects) => {
                    merged.merge(&effects);
                    (true, Some(effects), None)
                }
                RuleOutcome::Miss(reason) => (false, None, Some(reason)),
            };

            debug!(
                rule_id = reg.rule.id(),
                hit,
                priority = reg.priority,
                "rule evaluated"
            );

            records.push(RuleExecutionRecord {
                rule_id: reg.rule.id().to_string(),
                hit,
                priority: reg.priority,
                registration_order: reg.index,
                context_digest: context_digest.clone(),
                effect,
                miss_reason,
            });
        }

        Ok(RuleEngineResult {
            effects: merged,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit_rule(id: &'static str, field: &'static str, value: i64) -> Box<dyn Rule> {
        Box::new(FnRule::new(id, move |_ctx, _merged| {
            let mut effects = EffectSet::new();
            effects.set(field, serde_json::json!(value));
            Ok(RuleOutcome::Hit(effects))
        }))
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut engine = RuleEngine::new();
        engine.register_with(hit_rule("r1", "resources.wood", 1), 10, []);
        engine.register_with(hit_rule("r2", "resources.wood", 2), 10, []);

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let result = engine.evaluate(&ctx).unwrap();

        // Both hit; R2 ran second so its write wins on the shared field
        assert_eq!(result.records.len(), 2);
        assert!(result.records.iter().all(|r| r.hit));
        assert_eq!(
            result.effects.get("resources.wood"),
            Some(&serde_json::json!(2))
        );
    }

    #[test]
    fn test_higher_priority_runs_first() {
        let mut engine = RuleEngine::new();
        engine.register_with(hit_rule("low", "resources.wood", 1), 0, []);
        engine.register_with(hit_rule("high", "resources.wood", 2), 100, []);

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let result = engine.evaluate(&ctx).unwrap();

        assert_eq!(result.records[0].rule_id, "high");
        // low runs last, so its write wins
        assert_eq!(
            result.effects.get("resources.wood"),
            Some(&serde_json::json!(1))
        );
    }

    #[test]
    fn test_later_rule_observes_accumulator() {
        let mut engine = RuleEngine::new();
        engine.register(hit_rule("first", "resources.wood", 7));
        engine.register(Box::new(FnRule::new("second", |_ctx, merged| {
            // Fires only if the first rule's effect is visible
            if merged.get("resources.wood").is_some() {
                let mut effects = EffectSet::new();
                effects.set("resources.stone", serde_json::json!(1));
                Ok(RuleOutcome::Hit(effects))
            } else {
                Ok(RuleOutcome::Miss("wood not yet written".to_string()))
            }
        })));

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let result = engine.evaluate(&ctx).unwrap();

        assert!(result.records[1].hit);
    }

    #[test]
    fn test_rule_error_aborts_and_propagates() {
        let mut engine = RuleEngine::new();
        engine.register(hit_rule("ok", "resources.wood", 1));
        engine.register(Box::new(FnRule::new("broken", |_ctx, _merged| {
            Err(RuleError::RuleFailed {
                rule_id: "broken".to_string(),
                reason: "bad state".to_string(),
            })
        })));

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        assert!(engine.evaluate(&ctx).is_err());
    }

    #[test]
    fn test_records_are_stable_across_evaluations() {
        let mut engine = RuleEngine::new();
        engine.register_with(hit_rule("r1", "resources.wood", 1), 5, []);
        engine.register(Box::new(FnRule::new("r2", |_ctx, _merged| {
            Ok(RuleOutcome::Miss("never fires".to_string()))
        })));

        let world = WorldState::new(3);
        let ctx = RuleContext::environmental(&world, 3, 42);

        let first = engine.evaluate(&ctx).unwrap();
        let second = engine.evaluate(&ctx).unwrap();
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn test_tag_filtering() {
        let mut engine = RuleEngine::new();
        engine.register_with(hit_rule("env", "phenology.season", 0), 0, ["environmental"]);
        engine.register(hit_rule("other", "resources.wood", 1));

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let result = engine.evaluate_tagged(&ctx, "environmental").unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].rule_id, "env");
    }

    #[test]
    fn test_apply_to_produces_next_snapshot() {
        let mut engine = RuleEngine::new();
        engine.register(hit_rule("wood", "resources.wood", 9));

        let world = WorldState::new(0).with_resource("wood", 1);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let result = engine.evaluate(&ctx).unwrap();
        let next = result.apply_to(&world).unwrap();

        assert_eq!(world.resources.get("wood"), Some(&1));
        assert_eq!(next.resources.get("wood"), Some(&9));
    }

    #[test]
    fn test_apply_rejects_unknown_field_root() {
        let mut engine = RuleEngine::new();
        engine.register(hit_rule("bad", "weather.wind", 1));

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let result = engine.evaluate(&ctx).unwrap();

        assert!(matches!(
            result.apply_to(&world),
            Err(RuleError::InvalidEffect { .. })
        ));
    }
}
