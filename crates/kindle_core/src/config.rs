//! # World Configuration
//!
//! Loaded once at startup, either built in code:
//!
//! ```rust
//! use kindle_core::WorldConfig;
//!
//! let config = WorldConfig::default()
//!     .with_fixed_timestep(20.0)
//!     .with_max_fixed_updates(3);
//! assert!(config.validate().is_ok());
//! ```
//!
//! or parsed from TOML, where every key is optional:
//!
//! ```toml
//! fixed_timestep = 16.666
//! max_fixed_updates = 5
//! target_fps = 60
//!
//! [scheduler]
//! max_retries = 1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default fixed timestep: 60 updates per second, in milliseconds.
pub const DEFAULT_FIXED_TIMESTEP: f64 = 1000.0 / 60.0;

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Extra runs a failing system gets in one tick when its handler asks
    /// for [`crate::ErrorStrategy::Retry`].
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// World settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Fixed-update step in milliseconds.
    pub fixed_timestep: f64,
    /// Most fixed steps drained by one `update`. Leftover time beyond the
    /// cap is discarded.
    pub max_fixed_updates: u32,
    /// Tick rate of the self-driving loop.
    pub target_fps: u32,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: DEFAULT_FIXED_TIMESTEP,
            max_fixed_updates: 5,
            target_fps: 60,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`WorldConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks that the values make sense together.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fixed_timestep must be a positive number of milliseconds, got {}",
                self.fixed_timestep
            )));
        }
        if self.max_fixed_updates == 0 {
            return Err(ConfigError::Invalid("max_fixed_updates must be at least 1".into()));
        }
        if self.target_fps == 0 {
            return Err(ConfigError::Invalid("target_fps must be at least 1".into()));
        }
        Ok(())
    }

    /// Wall-clock interval between ticks of the self-driving loop.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    /// Sets the fixed timestep in milliseconds.
    #[must_use]
    pub fn with_fixed_timestep(mut self, millis: f64) -> Self {
        self.fixed_timestep = millis;
        self
    }

    /// Sets the per-update fixed step cap.
    #[must_use]
    pub fn with_max_fixed_updates(mut self, max: u32) -> Self {
        self.max_fixed_updates = max;
        self
    }

    /// Sets the self-driving loop rate.
    #[must_use]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Sets the per-tick retry budget of failing systems.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.scheduler.max_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert!((config.fixed_timestep - 16.666_666).abs() < 1e-3);
        assert_eq!(config.max_fixed_updates, 5);
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.scheduler.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WorldConfig::from_toml_str(
            r"
            fixed_timestep = 10.0

            [scheduler]
            max_retries = 3
            ",
        )
        .unwrap();
        assert!((config.fixed_timestep - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.max_fixed_updates, 5);
        assert_eq!(config.scheduler.max_retries, 3);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(WorldConfig::from_toml_str("").unwrap(), WorldConfig::default());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = WorldConfig::from_toml_str("fixed_step = 1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_non_positive_timestep() {
        for bad in ["fixed_timestep = 0.0", "fixed_timestep = -5.0", "fixed_timestep = nan"] {
            let err = WorldConfig::from_toml_str(bad).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{bad} -> {err}");
        }
    }

    #[test]
    fn test_missing_file() {
        let err = WorldConfig::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_frame_interval() {
        let config = WorldConfig::default().with_target_fps(50);
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
    }
}
