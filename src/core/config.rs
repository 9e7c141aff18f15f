//! Store configuration (`learnstate.toml` in the store root).
//!
//! Every field has a default, so a missing file is the same as an empty one.

use crate::core::error::LearnstateError;
use crate::core::schemas;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What happens to `completed_at` when a course drops back below 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompletionPolicy {
    /// Cleared when progress falls below 100%, set again on the next completion.
    #[default]
    Reversible,
    /// Set once on first completion and never cleared.
    Monotonic,
}

impl std::fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionPolicy::Reversible => write!(f, "reversible"),
            CompletionPolicy::Monotonic => write!(f, "monotonic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub completion_policy: CompletionPolicy,
    /// Percentage reported for a course that has no topics.
    pub empty_course_percentage: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            completion_policy: CompletionPolicy::Reversible,
            empty_course_percentage: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `LEARNSTATE_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub progress: ProgressConfig,
    pub logging: LoggingConfig,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), LearnstateError> {
        let pct = self.progress.empty_course_percentage;
        if !(0.0..=100.0).contains(&pct) {
            return Err(LearnstateError::ConfigError(format!(
                "progress.empty_course_percentage must be within 0..=100, got {}",
                pct
            )));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<StoreConfig, LearnstateError> {
    let config: StoreConfig =
        toml::from_str(content).map_err(|e| LearnstateError::ConfigError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(root: &Path) -> Result<StoreConfig, LearnstateError> {
    let config_path = root.join(schemas::CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(StoreConfig::default());
    }
    let content = fs::read_to_string(&config_path).map_err(LearnstateError::IoError)?;
    parse_config(&content)
}
