use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::context::RuleContext;

/// Errors raised by interrupt rules
///
/// These are fatal to the tick; the manager never swallows them.
#[derive(Debug, Error)]
pub enum InterruptError {
    /// An interrupt rule reported a failure
    #[error("interrupt rule {rule_id} failed: {reason}")]
    RuleFailed {
        /// Id of the failing interrupt rule
        rule_id: String,
        /// Reason reported by the rule
        reason: String,
    },
}

/// Kind of an interrupt signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptKind {
    /// Truncate the remaining work in the current tick
    HaltTick,
    /// Informational signal recorded but not acted on by the kernel
    Notice,
}

/// Structured message raised by an interrupt rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptSignal {
    /// What the narrator should do about it
    pub kind: InterruptKind,
    /// Structured payload describing the condition
    pub payload: serde_json::Value,
    /// Id of the rule that raised the signal
    pub origin_rule: String,
}

/// A rule that can raise interrupt signals when polled
pub trait InterruptRule: Send + Sync {
    /// Stable rule id, recorded on every signal
    fn id(&self) -> &str;

    /// Inspect the context and raise zero or more signals
    fn poll(&self, ctx: &RuleContext<'_>) -> Result<Vec<InterruptSignal>, InterruptError>;
}

/// Closure-backed interrupt rule for tests and built-ins
pub struct FnInterruptRule<F> {
    id: String,
    body: F,
}

impl<F> FnInterruptRule<F>
where
    F: Fn(&RuleContext<'_>) -> Result<Vec<InterruptSignal>, InterruptError> + Send + Sync,
{
    /// Wrap a closure as an interrupt rule
    pub fn new(id: impl Into<String>, body: F) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

impl<F> InterruptRule for FnInterruptRule<F>
where
    F: Fn(&RuleContext<'_>) -> Result<Vec<InterruptSignal>, InterruptError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn poll(&self, ctx: &RuleContext<'_>) -> Result<Vec<InterruptSignal>, InterruptError> {
        (self.body)(ctx)
    }
}

/// Ordered collection of interrupt rules
///
/// `poll` invokes every rule in registration order and returns the
/// concatenation of produced signals. Exceptions propagate; the
/// narrator decides what a `HaltTick` truncates.
#[derive(Default)]
pub struct InterruptManager {
    rules: Vec<Box<dyn InterruptRule>>,
}

impl InterruptManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register an interrupt rule; polling follows registration order
    pub fn register(&mut self, rule: Box<dyn InterruptRule>) {
        self.rules.push(rule);
    }

    /// Number of registered interrupt rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Poll every rule and concatenate their signals
    pub fn poll(&self, ctx: &RuleContext<'_>) -> Result<Vec<InterruptSignal>, InterruptError> {
        let mut signals = Vec::new();
        for rule in &self.rules {
            let mut raised = rule.poll(ctx)?;
            if !raised.is_empty() {
                debug!(rule_id = rule.id(), count = raised.len(), "interrupts raised");
            }
            signals.append(&mut raised);
        }
        Ok(signals)
    }
}

/// Whether any signal in a batch demands tick truncation
pub fn contains_halt(signals: &[InterruptSignal]) -> bool {
    signals.iter().any(|s| s.kind == InterruptKind::HaltTick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_world::WorldState;

    fn notice_rule(id: &'static str) -> Box<dyn InterruptRule> {
        Box::new(FnInterruptRule::new(id, move |_ctx| {
            Ok(vec![InterruptSignal {
                kind: InterruptKind::Notice,
                payload: serde_json::json!({ "from": id }),
                origin_rule: id.to_string(),
            }])
        }))
    }

    #[test]
    fn test_signals_concatenate_in_registration_order() {
        let mut manager = InterruptManager::new();
        manager.register(notice_rule("first"));
        manager.register(notice_rule("second"));

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let signals = manager.poll(&ctx).unwrap();

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].origin_rule, "first");
        assert_eq!(signals[1].origin_rule, "second");
    }

    #[test]
    fn test_halt_detection() {
        let mut manager = InterruptManager::new();
        manager.register(Box::new(FnInterruptRule::new("halt", |_ctx| {
            Ok(vec![InterruptSignal {
                kind: InterruptKind::HaltTick,
                payload: serde_json::Value::Null,
                origin_rule: "halt".to_string(),
            }])
        })));

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        let signals = manager.poll(&ctx).unwrap();

        assert!(contains_halt(&signals));
    }

    #[test]
    fn test_errors_propagate() {
        let mut manager = InterruptManager::new();
        manager.register(notice_rule("ok"));
        manager.register(Box::new(FnInterruptRule::new("broken", |_ctx| {
            Err(InterruptError::RuleFailed {
                rule_id: "broken".to_string(),
                reason: "sensor offline".to_string(),
            })
        })));

        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        assert!(manager.poll(&ctx).is_err());
    }

    #[test]
    fn test_empty_manager_returns_no_signals() {
        let manager = InterruptManager::new();
        let world = WorldState::new(0);
        let ctx = RuleContext::environmental(&world, 0, 0);
        assert!(manager.poll(&ctx).unwrap().is_empty());
    }
}
