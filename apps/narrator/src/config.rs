//! Configuration loading for the narrator binary
//!
//! YAML with `${VAR}` environment expansion applied to the raw text
//! before parsing. Unknown keys and missing variables fail loudly;
//! range validation happens at load so the kernel never sees an
//! invalid configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::narrator::Granularity;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Offending path
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },
    /// YAML was malformed or contained unknown keys
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yml::Error),
    /// A `${VAR}` reference named an unset variable
    #[error("environment variable {var} is not set")]
    MissingEnv {
        /// The unset variable
        var: String,
    },
    /// A value was outside its permitted range
    #[error("invalid config value: {reason}")]
    Invalid {
        /// The violated constraint
        reason: String,
    },
}

/// Clock section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClockConfig {
    /// Tick the clock starts at; must be >= 0
    #[serde(default)]
    pub start_tick: i64,
    /// Step used when no granularity table entry applies; must be > 0
    #[serde(default = "default_step")]
    pub default_step: u64,
}

fn default_step() -> u64 {
    1
}

/// Narrator section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NarratorSection {
    /// Retry budget per character per tick
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Granularity to advance by each tick
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
    /// Tick-step table per granularity
    pub granularity_steps: BTreeMap<Granularity, u64>,
    /// Path to the action whitelist YAML
    pub whitelist: String,
    /// Path of the event log to append to
    #[serde(default = "default_event_log")]
    pub event_log: String,
    /// Deadline budget for a whole tick's provider calls (milliseconds)
    #[serde(default = "default_tick_deadline_ms")]
    pub tick_deadline_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_granularity() -> Granularity {
    Granularity::Day
}

fn default_event_log() -> String {
    "events.jsonl".to_string()
}

fn default_tick_deadline_ms() -> u64 {
    30_000
}

/// One provider entry under `llm.providers`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Vendor contract to speak
    pub kind: vellum_llm::ProviderKind,
    /// Base endpoint
    pub endpoint: String,
    /// Default model name
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Transport timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    20_000
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider id used when a call names none
    pub default_provider: String,
    /// Provider registry
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Full narrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NarratorConfig {
    /// Root seed for all derived streams
    pub seed: u64,
    /// Clock section
    pub clock: ClockConfig,
    /// Narrator section
    pub narrator: NarratorSection,
    /// LLM section
    pub llm: LlmConfig,
}

impl NarratorConfig {
    /// Load, expand and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse configuration from YAML text
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env(raw)?;
        let config: NarratorConfig = serde_yml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.clock.start_tick < 0 {
            return Err(ConfigError::Invalid {
                reason: format!("clock.start_tick must be >= 0, got {}", self.clock.start_tick),
            });
        }
        if self.clock.default_step == 0 {
            return Err(ConfigError::Invalid {
                reason: "clock.default_step must be > 0".to_string(),
            });
        }

        for granularity in [
            Granularity::Year,
            Granularity::Month,
            Granularity::Day,
            Granularity::Immediate,
        ] {
            match self.narrator.granularity_steps.get(&granularity) {
                Some(0) => {
                    return Err(ConfigError::Invalid {
                        reason: format!("narrator.granularity_steps.{granularity} must be > 0"),
                    })
                }
                Some(_) => {}
                None => {
                    return Err(ConfigError::Invalid {
                        reason: format!("narrator.granularity_steps is missing {granularity}"),
                    })
                }
            }
        }

        if self.narrator.tick_deadline_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "narrator.tick_deadline_ms must be > 0".to_string(),
            });
        }

        if self.llm.providers.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "llm.providers must not be empty".to_string(),
            });
        }
        if !self.llm.providers.contains_key(&self.llm.default_provider) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "llm.default_provider {} is not in llm.providers",
                    self.llm.default_provider
                ),
            });
        }

        Ok(())
    }

    /// Resolve one provider entry into transport settings
    ///
    /// Reads the API key from the configured environment variable; an
    /// unset variable fails loudly here, at startup.
    pub fn provider_settings(
        &self,
        provider: &ProviderConfig,
    ) -> Result<vellum_llm::ProviderSettings, ConfigError> {
        let api_key = match &provider.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| ConfigError::MissingEnv { var: var.clone() })?,
            ),
            None => None,
        };

        Ok(vellum_llm::ProviderSettings {
            endpoint: provider.endpoint.trim_end_matches('/').to_string(),
            model: provider.model.clone(),
            api_key,
            timeout: Duration::from_millis(provider.timeout_ms),
        })
    }
}

/// Expand `${VAR}` references against the process environment
///
/// Unset variables fail loudly; there is no default syntax.
fn expand_env(raw: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| ConfigError::Invalid {
            reason: "unterminated ${ in config".to_string(),
        })?;
        let var = &after[..end];
        let value = std::env::var(var).map_err(|_| ConfigError::MissingEnv {
            var: var.to_string(),
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
