use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::Intent;

/// Errors raised while loading or applying the action whitelist
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WhitelistError {
    /// The whitelist file itself is malformed
    #[error("invalid whitelist: {reason}")]
    InvalidCatalog {
        /// What was wrong with the catalog
        reason: String,
    },
    /// Intent names an action absent from the whitelist
    #[error("unknown action: {action}")]
    UnknownAction {
        /// The offending action name
        action: String,
    },
    /// Intent omits a required parameter
    #[error("missing parameter for {action}: {parameter}")]
    MissingParameter {
        /// Action being validated
        action: String,
        /// The missing required parameter
        parameter: String,
    },
    /// Intent carries a parameter outside required or optional
    #[error("unknown parameter for {action}: {parameter}")]
    UnknownParameter {
        /// Action being validated
        action: String,
        /// The unexpected parameter
        parameter: String,
    },
}

/// Parameter schema for a single whitelisted action
///
/// Invariant: `required` and `optional` are disjoint; this is checked at
/// catalog load and the constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRule {
    /// Parameters that must be present
    #[serde(default)]
    pub required: BTreeSet<String>,
    /// Parameters that may be present
    #[serde(default)]
    pub optional: BTreeSet<String>,
}

impl ActionRule {
    /// Build a rule, rejecting overlapping parameter sets
    pub fn new(
        required: impl IntoIterator<Item = String>,
        optional: impl IntoIterator<Item = String>,
    ) -> Result<Self, WhitelistError> {
        let rule = Self {
            required: required.into_iter().collect(),
            optional: optional.into_iter().collect(),
        };
        rule.check_disjoint("<inline>")?;
        Ok(rule)
    }

    fn check_disjoint(&self, action: &str) -> Result<(), WhitelistError> {
        if let Some(shared) = self.required.intersection(&self.optional).next() {
            return Err(WhitelistError::InvalidCatalog {
                reason: format!(
                    "action {action}: parameter {shared} is both required and optional"
                ),
            });
        }
        Ok(())
    }
}

/// Loaded mapping from action name to parameter schema
///
/// Validation against the catalog is pure and side-effect-free: success
/// returns the intent unchanged, failure names the first violation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCatalog {
    actions: BTreeMap<String, ActionRule>,
}

impl ActionCatalog {
    /// Build a catalog from pre-constructed rules
    pub fn new(actions: BTreeMap<String, ActionRule>) -> Result<Self, WhitelistError> {
        let catalog = Self { actions };
        catalog.validate_catalog()?;
        Ok(catalog)
    }

    /// Parse a catalog from whitelist YAML
    ///
    /// Format: `action_name: {required: [..], optional: [..]}`.
    /// Duplicated action keys and overlapping parameter sets fail loudly.
    pub fn from_yaml(text: &str) -> Result<Self, WhitelistError> {
        let actions: BTreeMap<String, ActionRule> =
            serde_yml::from_str(text).map_err(|e| WhitelistError::InvalidCatalog {
                reason: e.to_string(),
            })?;
        Self::new(actions)
    }

    fn validate_catalog(&self) -> Result<(), WhitelistError> {
        for (action, rule) in &self.actions {
            rule.check_disjoint(action)?;
        }
        Ok(())
    }

    /// Whether `action` is whitelisted
    pub fn contains(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Look up the rule for an action
    pub fn rule(&self, action: &str) -> Option<&ActionRule> {
        self.actions.get(action)
    }

    /// Action names in stable order
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    /// Validate an intent against the catalog
    ///
    /// Checks, in order: the action exists, every required parameter is
    /// present, and no parameter lies outside the required and optional sets.
    pub fn validate<'a>(&self, intent: &'a Intent) -> Result<&'a Intent, WhitelistError> {
        let rule = self
            .actions
            .get(&intent.action)
            .ok_or_else(|| WhitelistError::UnknownAction {
                action: intent.action.clone(),
            })?;

        for required in &rule.required {
            if !intent.parameters.contains_key(required) {
                return Err(WhitelistError::MissingParameter {
                    action: intent.action.clone(),
                    parameter: required.clone(),
                });
            }
        }

        for parameter in intent.parameters.keys() {
            if !rule.required.contains(parameter) && !rule.optional.contains(parameter) {
                return Err(WhitelistError::UnknownParameter {
                    action: intent.action.clone(),
                    parameter: parameter.clone(),
                });
            }
        }

        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CharacterId;

    fn move_catalog() -> ActionCatalog {
        ActionCatalog::from_yaml("move:\n  required: [to]\n  optional: [speed]\n").unwrap()
    }

    #[test]
    fn test_valid_intent_passes_unchanged() {
        let catalog = move_catalog();
        let intent = Intent::new("move", CharacterId::from("a"), 0)
            .with_parameter("to", serde_json::json!("x"));

        let validated = catalog.validate(&intent).unwrap();
        assert_eq!(validated, &intent);
    }

    #[test]
    fn test_missing_required_parameter() {
        let catalog = move_catalog();
        let intent = Intent::new("move", CharacterId::from("a"), 0);

        assert!(matches!(
            catalog.validate(&intent),
            Err(WhitelistError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_unknown_action() {
        let catalog = move_catalog();
        let intent = Intent::new("fly", CharacterId::from("a"), 0)
            .with_parameter("to", serde_json::json!("x"));

        assert!(matches!(
            catalog.validate(&intent),
            Err(WhitelistError::UnknownAction { .. })
        ));
    }

    #[test]
    fn test_unknown_parameter() {
        let catalog = move_catalog();
        let intent = Intent::new("move", CharacterId::from("a"), 0)
            .with_parameter("to", serde_json::json!("x"))
            .with_parameter("cost", serde_json::json!(1));

        assert!(matches!(
            catalog.validate(&intent),
            Err(WhitelistError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_optional_parameter_accepted() {
        let catalog = move_catalog();
        let intent = Intent::new("move", CharacterId::from("a"), 0)
            .with_parameter("to", serde_json::json!("x"))
            .with_parameter("speed", serde_json::json!("fast"));

        assert!(catalog.validate(&intent).is_ok());
    }

    #[test]
    fn test_overlapping_parameter_sets_rejected() {
        let result = ActionCatalog::from_yaml("move:\n  required: [to]\n  optional: [to]\n");
        assert!(matches!(
            result,
            Err(WhitelistError::InvalidCatalog { .. })
        ));
    }

    #[test]
    fn test_duplicate_action_keys_rejected() {
        let result = ActionCatalog::from_yaml(
            "move:\n  required: [to]\nmove:\n  required: [from]\n",
        );
        assert!(matches!(
            result,
            Err(WhitelistError::InvalidCatalog { .. })
        ));
    }
}
