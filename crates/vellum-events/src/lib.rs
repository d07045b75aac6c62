//! Event log for the VELLUM narrative engine
//!
//! The event log is the canonical record of everything the narrator
//! adjudicated: every attempt, every verdict, every fallback, and the
//! final outcome for each character each tick. Records are appended
//! exactly once and never mutated; replay equality of two logs is the
//! proof that two runs took the same path.

/// Event record schema and invariants
pub mod record;

/// Append-only sinks
pub mod log;

/// Re-export commonly used types
pub use log::{EventSink, JsonlEventSink, MemoryEventSink};
pub use record::{EventLogError, EventRecord, FinalRecord, TokenTotals};
