// Executor settings
// Loaded from ~/.config/luapad/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::{BoundStrategy, ExecutorConfig};

/// Default wall-clock budget for one script run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How many interpreter instructions pass between bound checks.
pub const DEFAULT_SAMPLE_INTERVAL: u32 = 100_000;

/// Output line cap per run; past it the report carries a truncation notice.
pub const DEFAULT_MAX_OUTPUT_LINES: usize = 5_000;

/// Persisted settings for the script pad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wall-clock timeout for one run, in whole seconds
    pub timeout_secs: u64,

    /// Instructions between bound checks (hook strategy and the
    /// bounded-wait cancel check alike)
    pub instruction_sample_interval: u32,

    /// Which bounded-execution strategy runs scripts
    pub strategy: BoundStrategy,

    /// Captured output line cap per run
    pub max_output_lines: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            instruction_sample_interval: DEFAULT_SAMPLE_INTERVAL,
            strategy: BoundStrategy::CooperativeHook,
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("luapad")
            .join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from an explicit path, falling back to defaults.
    /// A missing file is the normal first-run case and is silent; a file
    /// that exists but does not parse is worth a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("invalid settings file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("could not read settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save current settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(&path, json).map_err(|e| e.to_string())
    }

    /// Runtime configuration for the executor.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            sample_interval: self.instruction_sample_interval,
            strategy: self.strategy,
            max_output_lines: self.max_output_lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.timeout_secs, 5);
        assert_eq!(settings.instruction_sample_interval, 100_000);
        assert_eq!(settings.strategy, BoundStrategy::CooperativeHook);
        assert_eq!(settings.max_output_lines, 5_000);
    }

    #[test]
    fn test_partial_file_fills_missing_fields() {
        let settings: Settings =
            serde_json::from_str(r#"{"timeout_secs": 2, "strategy": "wait"}"#).unwrap();
        assert_eq!(settings.timeout_secs, 2);
        assert_eq!(settings.strategy, BoundStrategy::BoundedWait);
        assert_eq!(settings.instruction_sample_interval, DEFAULT_SAMPLE_INTERVAL);
        assert_eq!(settings.max_output_lines, DEFAULT_MAX_OUTPUT_LINES);
    }

    #[test]
    fn test_round_trip() {
        let mut settings = Settings::default();
        settings.timeout_secs = 30;
        settings.strategy = BoundStrategy::BoundedWait;

        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_load_from_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_garbage_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"timeout_secs": 1, "max_output_lines": 10}"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.timeout_secs, 1);
        assert_eq!(settings.max_output_lines, 10);
    }

    #[test]
    fn test_executor_config_conversion() {
        let settings = Settings { timeout_secs: 7, ..Settings::default() };
        let config = settings.executor_config();
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert_eq!(config.sample_interval, DEFAULT_SAMPLE_INTERVAL);
    }
}
