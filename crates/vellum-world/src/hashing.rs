//! Canonical state hashing for replay verification
//!
//! Hash equality is the proof of determinism: two runs that produce the
//! same snapshots must produce the same digests. All domain collections
//! are `BTreeMap`s, so their serde output is already canonical; digests
//! are blake3 over that serialization.

use blake3::Hasher;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::types::WorldState;

/// Errors raised while computing digests
#[derive(Debug, Error)]
pub enum HashingError {
    /// State could not be serialized for hashing
    #[error("canonical serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Digest of a full world snapshot
///
/// Includes the tick so two otherwise-identical snapshots at different
/// ticks never collide.
pub fn world_digest(world: &WorldState) -> Result<[u8; 32], HashingError> {
    let mut hasher = Hasher::new();
    let _ = hasher.update(&world.tick.to_le_bytes());
    let _ = hasher.update(&serde_json::to_vec(world)?);

    let digest = hasher.finalize().into();
    debug!(tick = world.tick, digest = %hex::encode(digest), "world digest computed");
    Ok(digest)
}

/// Digest of any canonical value
///
/// Used for rule-context digests and DM package digests. The value must
/// already be deterministically ordered; this function only serializes
/// and hashes.
pub fn value_digest<T: Serialize>(value: &T) -> Result<[u8; 32], HashingError> {
    let mut hasher = Hasher::new();
    let _ = hasher.update(&serde_json::to_vec(value)?);
    Ok(hasher.finalize().into())
}

/// Short hex rendering of a digest for logs and records
pub fn digest_hex(digest: &[u8; 32]) -> String {
    hex::encode(digest)
}
