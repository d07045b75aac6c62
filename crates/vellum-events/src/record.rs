use serde::{Deserialize, Serialize};
use thiserror::Error;

use vellum_world::{CharacterId, Intent, Outcome, ReasonCode, VerdictRecord};

/// Errors raised by the event log
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Record violates a structural invariant
    #[error("invalid event record: {reason}")]
    InvalidRecord {
        /// The violated invariant
        reason: String,
    },
    /// Appended tick is lower than a previously appended tick
    #[error("non-monotonic tick: last {last}, got {got}")]
    NonMonotonicTick {
        /// Highest tick seen so far
        last: u64,
        /// Tick of the rejected record
        got: u64,
    },
    /// Record could not be serialized
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Sink IO failed; fatal to the run
    #[error("event log io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Aggregated token usage across every provider call behind one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    /// Prompt tokens
    pub prompt: u64,
    /// Completion tokens
    pub completion: u64,
    /// Prompt + completion
    pub total: u64,
}

impl TokenTotals {
    /// Accumulate another usage reading
    pub fn add(&mut self, prompt: u64, completion: u64) {
        self.prompt += prompt;
        self.completion += completion;
        self.total = self.prompt + self.completion;
    }
}

/// The committed intent and its resolved outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    /// The intent that was committed (last approved attempt or fallback)
    pub intent: Intent,
    /// DM outcome, rule trace included
    pub outcome: Outcome,
    /// Whether the fallback policy produced the committed intent
    pub fallback: bool,
    /// Last reject code, present iff `fallback` is true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<ReasonCode>,
}

/// One line of the event log: a character's full tick history
///
/// Appended exactly once per character per tick, after all retries and
/// fallbacks. The verdict chain always has at least one entry and ends
/// in approval unless the fallback flag (or the aborted marker) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Tick the event belongs to
    pub tick: u64,
    /// Character the event belongs to
    pub character_id: CharacterId,
    /// Every attempt in solicitation order
    pub attempts: Vec<VerdictRecord>,
    /// The committed intent and outcome
    #[serde(rename = "final")]
    pub final_record: FinalRecord,
    /// Seed labels consumed while producing this event, in open order
    pub seed_labels: Vec<String>,
    /// Token usage across all attempts and the DM call
    pub token_usage: TokenTotals,
    /// Set when the tick aborted before this event completed normally
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
}

impl EventRecord {
    /// Check the record's structural invariants
    ///
    /// - the verdict chain is non-empty
    /// - the chain ends APPROVED, or the final record is a fallback
    /// - `fallback == true` implies a fallback reason is present
    ///
    /// Aborted records are exempt from chain-termination checks; they
    /// document a truncated tick, not a committed outcome.
    pub fn validate(&self) -> Result<(), EventLogError> {
        if self.attempts.is_empty() {
            return Err(EventLogError::InvalidRecord {
                reason: "verdict chain is empty".to_string(),
            });
        }

        if self.final_record.fallback && self.final_record.fallback_reason.is_none() {
            return Err(EventLogError::InvalidRecord {
                reason: "fallback without fallback_reason".to_string(),
            });
        }

        if self.aborted {
            return Ok(());
        }

        let last_approved = self
            .attempts
            .last()
            .map(|a| a.verdict.is_approved())
            .unwrap_or(false);
        if !last_approved && !self.final_record.fallback {
            return Err(EventLogError::InvalidRecord {
                reason: "verdict chain ends rejected without fallback".to_string(),
            });
        }

        Ok(())
    }
}
