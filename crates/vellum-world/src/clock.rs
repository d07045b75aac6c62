use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the global clock
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// A constructor or operation received an argument outside its domain
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable reason for the rejection
        reason: String,
    },
}

/// Monotonic tick counter for the simulation kernel
///
/// Ticks are opaque non-negative integers; there is deliberately no
/// mapping to wall-clock or calendar time in this version. Callers that
/// need calendar semantics must layer above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalClock {
    current: u64,
}

impl GlobalClock {
    /// Create a clock starting at `start_tick`
    ///
    /// Fails with an invalid-argument error when `start_tick` is
    /// negative. The signed parameter exists so configuration input can
    /// be rejected here instead of silently wrapping.
    pub fn new(start_tick: i64) -> Result<Self, ClockError> {
        if start_tick < 0 {
            return Err(ClockError::InvalidArgument {
                reason: format!("start_tick must be >= 0, got {start_tick}"),
            });
        }
        Ok(Self {
            current: start_tick as u64,
        })
    }

    /// Current tick
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Advance the clock by `step` ticks and return the new tick
    ///
    /// Fails with an invalid-argument error when `step == 0`; the clock
    /// is monotonic non-decreasing and never advanced by nothing.
    pub fn advance(&mut self, step: u64) -> Result<u64, ClockError> {
        let next = self.peek(step)?;
        self.current = next;
        Ok(next)
    }

    /// Tick the clock would reach after `advance(step)`, without advancing
    pub fn peek(&self, step: u64) -> Result<u64, ClockError> {
        if step == 0 {
            return Err(ClockError::InvalidArgument {
                reason: "step must be > 0".to_string(),
            });
        }
        self.current.checked_add(step).ok_or_else(|| {
            ClockError::InvalidArgument {
                reason: format!("tick overflow: {} + {}", self.current, step),
            }
        })
    }
}
