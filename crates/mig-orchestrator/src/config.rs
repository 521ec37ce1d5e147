//! Migrator configuration
//!
//! Resolution order, highest priority first:
//! 1. Environment variables (`MIG_REVIEW_THRESHOLD`, `MIG_MAX_CONCURRENCY`)
//! 2. TOML file
//! 3. Compiled defaults

use crate::error::OrchestratorError;
use mig_transform::{EngineConfig, RecoveryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Orchestrator behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Snapshot files before transforming
    pub create_backups: bool,
    /// Keep the snapshot after a successful job so it can be rolled back
    pub retain_backups_after_success: bool,
    /// Per-job broadcast buffer
    pub event_buffer: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            create_backups: true,
            retain_backups_after_success: true,
            event_buffer: 256,
        }
    }
}

/// Progress stream behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Idle keepalive period
    pub keepalive_secs: u64,
    /// Hard ceiling on a subscription
    pub max_duration_secs: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keepalive_secs: 15,
            max_duration_secs: 3_600,
        }
    }
}

impl StreamSettings {
    /// Keepalive period
    #[inline]
    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Subscription ceiling
    #[inline]
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Full configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Engine
    pub transform: EngineConfig,
    /// Semantic-pass recovery
    pub recovery: RecoveryConfig,
    /// Orchestrator
    pub orchestrator: OrchestratorSettings,
    /// Progress streams
    pub stream: StreamSettings,
}

impl MigratorConfig {
    /// Parse TOML text
    ///
    /// # Errors
    /// `OrchestratorError::Config` on invalid TOML or values
    pub fn from_toml_str(text: &str) -> Result<Self, OrchestratorError> {
        let config: Self =
            toml::from_str(text).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// `OrchestratorError::Config` when the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, OrchestratorError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Defaults, then `path` if given, then environment overrides
    ///
    /// # Errors
    /// `OrchestratorError::Config` for unreadable files or malformed values
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self, OrchestratorError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MIG_*` overrides read through `lookup`
    ///
    /// # Errors
    /// `OrchestratorError::Config` when a variable does not parse
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MIG_REVIEW_THRESHOLD") {
            self.transform.review_threshold = raw.trim().parse().map_err(|_| {
                OrchestratorError::Config(format!("MIG_REVIEW_THRESHOLD is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = lookup("MIG_MAX_CONCURRENCY") {
            self.transform.max_concurrency = raw.trim().parse().map_err(|_| {
                OrchestratorError::Config(format!("MIG_MAX_CONCURRENCY is not a number: {raw}"))
            })?;
        }
        Ok(self)
    }

    /// Reject unusable values
    ///
    /// # Errors
    /// `OrchestratorError::Config` naming the offending key
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.transform.max_concurrency == 0 {
            return Err(OrchestratorError::Config(
                "transform.max_concurrency must be at least 1".into(),
            ));
        }
        if self.transform.review_threshold > 100 {
            return Err(OrchestratorError::Config(
                "transform.review_threshold must be between 0 and 100".into(),
            ));
        }
        if self.stream.max_duration_secs == 0 {
            return Err(OrchestratorError::Config(
                "stream.max_duration_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
