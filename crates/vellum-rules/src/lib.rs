//! Rule evaluation for the VELLUM narrative engine
//!
//! Rules are the only mechanism that turns adjudicated outcomes into new
//! world snapshots. Evaluation order is total and stable, every rule run
//! produces an audit record, and errors always propagate: a rule that
//! fails aborts the evaluation rather than being silently skipped.

/// Evaluation context and effect sets
pub mod context;

/// Priority-ordered rule engine with audited evaluation
pub mod engine;

/// Interrupt rules and signal aggregation
pub mod interrupt;

/// Re-export commonly used types
pub use context::{EffectSet, RuleContext};
pub use engine::{
    FnRule, Rule, RuleEngine, RuleEngineResult, RuleError, RuleExecutionRecord, RuleOutcome,
};
pub use interrupt::{
    contains_halt, FnInterruptRule, InterruptError, InterruptKind, InterruptManager,
    InterruptRule, InterruptSignal,
};
