//! Mode configuration file.
//!
//! ## Learning: Serde for Serialization
//!
//! `#[serde(default)]` fills missing fields from `Default::default()`, so
//! settings files stay backward-compatible as knobs are added: an embedder
//! can ship a file that only overrides the debounce interval.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use langbridge_worker::{StructuralOptions, WorkerTiming};

use crate::defaults::{DiagnosticsOptions, FeatureToggles};

/// Everything tunable about one language mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModeSettings {
    /// Analysis engine options
    pub structural: StructuralOptions,

    /// Which validation passes to suppress
    pub diagnostics: DiagnosticsOptions,

    /// Which features to register
    pub toggles: FeatureToggles,

    /// Debounce and idle-disposal intervals
    pub timing: TimingConfig,
}

impl ModeSettings {
    /// Loads settings from the default location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from_default_path().unwrap_or_default()
    }

    /// Loads settings from a file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    fn load_from_default_path() -> Result<Self, SettingsError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default settings file path.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(config_dir.join("langbridge").join("settings.toml"))
    }

    /// Saves the settings to the default location.
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

/// Debounce and idle-disposal intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Quiet period after an edit before validation runs (ms)
    pub debounce_ms: u64,

    /// An idle worker older than this is disposed (s)
    pub idle_timeout_secs: u64,

    /// How often worker idleness is checked (s)
    pub idle_check_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            idle_timeout_secs: 120,
            idle_check_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn worker_timing(&self) -> WorkerTiming {
        WorkerTiming {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            idle_check: Duration::from_secs(self.idle_check_secs),
        }
    }
}

/// Settings file errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ModeSettings::default();
        assert_eq!(settings.timing.debounce_ms, 400);
        assert_eq!(settings.timing.idle_timeout_secs, 120);
        assert!(settings.toggles.completions);
        assert!(!settings.diagnostics.no_syntax_validation);
    }

    #[test]
    fn test_settings_roundtrip() {
        let mut settings = ModeSettings::default();
        settings.timing.debounce_ms = 250;
        settings.structural.case_sensitive = false;

        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: ModeSettings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[timing]\ndebounce_ms = 100\n").unwrap();

        let settings = ModeSettings::load_from(&path).unwrap();
        assert_eq!(settings.timing.debounce_ms, 100);
        assert_eq!(settings.timing.idle_timeout_secs, 120);
        assert!(settings.toggles.hovers);
    }
}
