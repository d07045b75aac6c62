//! Fixed response shapes for structured completions
//!
//! The kernel only ever asks a model for one of three shapes: an intent,
//! a DM decision, or a health probe echo. Validation is structural and
//! total: a response either parses into the requested shape or the call
//! fails with a validation error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::ProviderError;

/// Which fixed response shape a structured completion must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseSchema {
    /// `{action, parameters, flavor_text}`
    IntentResponse,
    /// `{verdict, reason, outcome}`
    DecisionResponse,
    /// `{status}`
    HealthCheck,
}

impl ResponseSchema {
    /// Human-readable shape description, embedded in prompts
    pub fn describe(&self) -> &'static str {
        match self {
            ResponseSchema::IntentResponse => {
                r#"{"action": "<whitelisted action name>", "parameters": {"<key>": <value>}, "flavor_text": "<one or two sentences>"}"#
            }
            ResponseSchema::DecisionResponse => {
                r#"{"verdict": "APPROVED" | "REJECTED", "reason": "<short reason>", "outcome": {"effects": {"<field>": <value>}, "narration": "<text>"}}"#
            }
            ResponseSchema::HealthCheck => r#"{"status": "ok"}"#,
        }
    }

    /// Extract and validate the structured payload from completion text
    ///
    /// Models wrap JSON in prose more often than not, so extraction
    /// tries the whole text first and falls back to the outermost brace
    /// span. The returned value is guaranteed to satisfy the shape.
    pub fn parse(&self, provider_id: &str, text: &str) -> Result<serde_json::Value, ProviderError> {
        let value = extract_json(text).ok_or_else(|| ProviderError::Validation {
            provider_id: provider_id.to_string(),
            reason: "no JSON object found in response".to_string(),
        })?;

        self.validate(&value).map_err(|reason| ProviderError::Validation {
            provider_id: provider_id.to_string(),
            reason,
        })?;

        Ok(value)
    }

    /// Check a candidate value against the shape
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), String> {
        match self {
            ResponseSchema::IntentResponse => {
                let _: IntentPayload = serde_json::from_value(value.clone())
                    .map_err(|e| format!("intent shape: {e}"))?;
                Ok(())
            }
            ResponseSchema::DecisionResponse => {
                let payload: DecisionPayload = serde_json::from_value(value.clone())
                    .map_err(|e| format!("decision shape: {e}"))?;
                if payload.verdict != "APPROVED" && payload.verdict != "REJECTED" {
                    return Err(format!(
                        "decision verdict must be APPROVED or REJECTED, got {}",
                        payload.verdict
                    ));
                }
                Ok(())
            }
            ResponseSchema::HealthCheck => {
                let status = value
                    .get("status")
                    .and_then(|s| s.as_str())
                    .ok_or_else(|| "health shape: missing status".to_string())?;
                if status.is_empty() {
                    return Err("health shape: empty status".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Typed view of an intent response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPayload {
    /// Declared action name
    pub action: String,
    /// Action parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Narrative flavor text
    #[serde(default)]
    pub flavor_text: String,
}

/// Typed view of a DM decision response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    /// `APPROVED` or `REJECTED`
    pub verdict: String,
    /// Short reason for the verdict
    #[serde(default)]
    pub reason: String,
    /// Structured outcome payload
    #[serde(default)]
    pub outcome: serde_json::Value,
}

/// Find a JSON object in completion text
///
/// Tries the full text, then the outermost `{ ... }` span.
fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
