//! Deterministic seed derivation for the VELLUM narrative engine
//!
//! This crate provides labeled sub-seed derivation and restartable RNG
//! streams with audit logging, required for replay determinism.
//!
//! # Features
//!
//! - SHA-256 based sub-seed derivation from a 64-bit root seed
//! - Label-keyed ChaCha20 streams (same label, same sequence, always)
//! - Complete audit logging of every stream the narrator opens
//! - Deterministic replay and verification support
//!
//! # Usage
//!
//! ```rust
//! use seed::SeedManager;
//! use rand::RngCore;
//!
//! let mut seeds = SeedManager::new(0x1337);
//! let mut rng = seeds.rng("tick:1:char:gwen:attempt:0");
//! let value = rng.next_u64();
//! ```

/// Root seed management and sub-seed derivation
pub mod manager;

/// Audit log for all opened streams
pub mod audit_log;

/// Narrator label conventions
pub mod labels;

/// Re-export commonly used types
pub use audit_log::{SeedAuditLog, StreamOpenRecord};
pub use labels::{attempt_label, purpose_label};
pub use manager::SeedManager;
