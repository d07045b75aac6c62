use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::CharacterId;

/// Structured reason code attached to rejections and fallbacks
///
/// The set is closed; free-text detail travels in the narrator note,
/// never in the code itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    /// Action is not present in the whitelist
    #[serde(rename = "unknown-action")]
    UnknownAction,
    /// A required parameter is missing
    #[serde(rename = "missing-parameter")]
    MissingParameter,
    /// A parameter lies outside the required and optional sets
    #[serde(rename = "unknown-parameter")]
    UnknownParameter,
    /// Provider call exceeded its deadline
    #[serde(rename = "timeout")]
    Timeout,
    /// Provider failed for a non-deadline reason
    #[serde(rename = "provider_error")]
    ProviderError,
    /// The DM rejected the intent on narrative grounds
    #[serde(rename = "dm-rejected")]
    DmRejected,
}

impl ReasonCode {
    /// Wire representation, matching the event log format
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::UnknownAction => "unknown-action",
            ReasonCode::MissingParameter => "missing-parameter",
            ReasonCode::UnknownParameter => "unknown-parameter",
            ReasonCode::Timeout => "timeout",
            ReasonCode::ProviderError => "provider_error",
            ReasonCode::DmRejected => "dm-rejected",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A character's declared action for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Action name; must appear in the whitelist unless this is a fallback
    pub action: String,
    /// Action parameters, deterministically ordered
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Free-text narration accompanying the action
    pub flavor_text: String,
    /// Author character
    pub author: CharacterId,
    /// Zero-based attempt index within the tick
    pub attempt: u32,
}

impl Intent {
    /// Create an intent with no parameters
    pub fn new(action: impl Into<String>, author: CharacterId, attempt: u32) -> Self {
        Self {
            action: action.into(),
            parameters: BTreeMap::new(),
            flavor_text: String::new(),
            author,
            attempt,
        }
    }

    /// Builder-style parameter insertion
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let _ = self.parameters.insert(key.into(), value);
        self
    }
}

/// The narrator's binary decision on an intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Intent proceeds to DM resolution
    Approved,
    /// Intent is rejected; a reason code is always present
    Rejected {
        /// Why the intent was rejected
        reason: ReasonCode,
    },
}

impl Verdict {
    /// Whether this verdict approves the intent
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved)
    }

    /// The reason code, if rejected
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Verdict::Approved => None,
            Verdict::Rejected { reason } => Some(*reason),
        }
    }
}

/// One adjudicated attempt: the intent and the verdict it drew
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    /// The intent as solicited
    pub intent: Intent,
    /// The narrator's decision
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Optional free-text note from the narrator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Structured result of DM resolution for one committed intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Final verdict carried into the event log
    pub verdict: Verdict,
    /// Structured result payload produced by the DM
    pub result: serde_json::Value,
    /// Rule ids that fired while applying this outcome, in stable order
    pub rule_trace: Vec<String>,
    /// Whether this outcome came from the fallback policy
    pub fallback: bool,
    /// Last reject code, present iff `fallback` is true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<ReasonCode>,
}

impl Outcome {
    /// Outcome for a normally approved intent
    pub fn approved(result: serde_json::Value) -> Self {
        Self {
            verdict: Verdict::Approved,
            result,
            rule_trace: Vec::new(),
            fallback: false,
            fallback_reason: None,
        }
    }

    /// Outcome committed through the fallback policy
    pub fn fallback(result: serde_json::Value, reason: ReasonCode) -> Self {
        Self {
            verdict: Verdict::Approved,
            result,
            rule_trace: Vec::new(),
            fallback: true,
            fallback_reason: Some(reason),
        }
    }
}
