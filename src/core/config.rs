//! Pipeline configuration with documented constants
//!
//! Every tunable threshold lives here. Each section can be omitted from the
//! TOML file, in which case its defaults apply.

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Intent detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Candidates scoring below this are discarded
    ///
    /// If nothing survives, the utterance is rejected.
    pub min_confidence: f32,

    /// Minimum lead the best candidate needs over the runner-up
    ///
    /// A smaller lead marks the detection ambiguous and the user is asked
    /// to pick instead of the pipeline guessing.
    pub ambiguity_margin: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            ambiguity_margin: 0.1,
        }
    }
}

/// Which prior slots may flow into a new turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarryOverScope {
    /// Only when the new turn resolves to the same intent as the last one
    SameIntent,
    /// Same intent carries everything; a different intent carries the
    /// slots whose names both schemas declare
    #[default]
    SharedSlots,
}

/// Session context behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Seconds without activity before a session is evicted
    ///
    /// At the default (1800) a session is forgotten after 30 idle minutes.
    pub idle_timeout_secs: u64,

    /// Seconds after which a carried slot value is too old to reuse
    pub slot_staleness_secs: u64,

    /// Extraction confidence a new value needs to replace a carried one
    pub overwrite_confidence_floor: f32,

    /// Carry-over heuristic across turns
    pub carry_over: CarryOverScope,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            slot_staleness_secs: 10 * 60,
            overwrite_confidence_floor: 0.5,
            carry_over: CarryOverScope::SharedSlots,
        }
    }
}

impl ContextConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn slot_staleness(&self) -> Duration {
        Duration::from_secs(self.slot_staleness_secs)
    }
}

/// Where intent schemas are loaded from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory scanned (recursively, sorted) for `*.toml` intent files
    pub intents_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            intents_dir: PathBuf::from("data/intents"),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub context: ContextConfig,
    pub registry: RegistryConfig,
}

impl PipelineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "detection.min_confidence ({}) must be within [0, 1]",
                d.min_confidence
            )));
        }
        if !(0.0..=1.0).contains(&d.ambiguity_margin) {
            return Err(ConfigError::Invalid(format!(
                "detection.ambiguity_margin ({}) must be within [0, 1]",
                d.ambiguity_margin
            )));
        }

        let c = &self.context;
        if c.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "context.idle_timeout_secs must be positive".into(),
            ));
        }
        if c.slot_staleness_secs > c.idle_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "context.slot_staleness_secs ({}) should be <= idle_timeout_secs ({})",
                c.slot_staleness_secs, c.idle_timeout_secs
            )));
        }
        if !(0.0..=1.0).contains(&c.overwrite_confidence_floor) {
            return Err(ConfigError::Invalid(format!(
                "context.overwrite_confidence_floor ({}) must be within [0, 1]",
                c.overwrite_confidence_floor
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.min_confidence, 0.3);
        assert_eq!(config.detection.ambiguity_margin, 0.1);
        assert_eq!(config.context.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(config.context.carry_over, CarryOverScope::SharedSlots);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
[detection]
min_confidence = 0.5

[context]
carry_over = "same_intent"
"#,
        )
        .unwrap();
        assert_eq!(config.detection.min_confidence, 0.5);
        assert_eq!(config.detection.ambiguity_margin, 0.1);
        assert_eq!(config.context.carry_over, CarryOverScope::SameIntent);
        assert_eq!(config.context.idle_timeout_secs, 1800);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let result = PipelineConfig::from_toml_str("[detection]\nmin_confidence = 1.5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_staleness_longer_than_timeout_rejected() {
        let mut config = PipelineConfig::default();
        config.context.slot_staleness_secs = config.context.idle_timeout_secs + 1;
        assert!(config.validate().is_err());
    }
}
