//! The VELLUM narrator
//!
//! Per-tick orchestrator for the simulation kernel: advances the clock,
//! runs the environmental rule pre-pass, solicits intents from active
//! characters through the provider router, adjudicates and retries,
//! falls back when retries exhaust, resolves approved intents through
//! the DM, applies outcomes through the rule engine, and commits one
//! event per character to the append-only log.
//!
//! The narrator owns the tick's mutable accumulator; every other
//! component receives immutable snapshots and returns new values.

/// Configuration loading and validation
pub mod config;

/// Static fallback policy table
pub mod fallback;

/// Stateless DM resolution
pub mod dm;

/// Built-in environmental rules
pub mod phenology;

/// Deterministic genesis world
pub mod genesis;

/// The per-tick orchestration loop
pub mod narrator;

pub use config::{ConfigError, NarratorConfig};
pub use dm::{DmPackage, DmResolver};
pub use fallback::FallbackPolicy;
pub use narrator::{Granularity, Narrator, NarratorError, NarratorOptions, TickReport};
