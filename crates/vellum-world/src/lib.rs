//! Domain model for the VELLUM narrative engine
//!
//! This crate holds the immutable value objects the kernel operates on:
//! the global clock, characters and world snapshots, intents and
//! verdicts, the action whitelist, visibility scoping, and canonical
//! state hashing. Nothing here suspends or performs IO; state
//! progression is always expressed by producing new values.

pub mod clock;
pub mod types;
pub mod intent;
pub mod whitelist;
pub mod visibility;
pub mod hashing;

pub use clock::{ClockError, GlobalClock};
pub use intent::{Intent, Outcome, ReasonCode, Verdict, VerdictRecord};
pub use types::{Character, CharacterId, StateMode, WorldState};
pub use whitelist::{ActionCatalog, ActionRule, WhitelistError};
pub use visibility::{CharacterView, VisibilityScope};
