//! Configuration and settings management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub ui: UiSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSettings {
    /// Marker shown next to unsaved files and directories containing them
    #[serde(default = "default_unsaved_marker")]
    pub unsaved_marker: String,
    /// How long the browser waits for input before redrawing
    #[serde(default = "default_tick_rate_ms")]
    pub tick_rate_ms: u64,
    /// Whether dot-entries are listed in the browser
    #[serde(default = "default_show_hidden")]
    pub show_hidden: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            unsaved_marker: default_unsaved_marker(),
            tick_rate_ms: default_tick_rate_ms(),
            show_hidden: default_show_hidden(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directives, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Where the interactive browser writes its log. Without one it logs
    /// nothing, since the terminal belongs to the UI.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
        }
    }
}

fn default_unsaved_marker() -> String {
    "●".to_string()
}

fn default_tick_rate_ms() -> u64 {
    100
}

fn default_show_hidden() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a file, or return defaults if file doesn't exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        Ok(())
    }

    /// Get the default settings file path
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("filetree");

        config_dir.join("settings.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.ui.unsaved_marker, "●");
        assert_eq!(settings.ui.tick_rate_ms, 100);
        assert!(settings.ui.show_hidden);
        assert_eq!(settings.log.filter, "info");
        assert!(settings.log.file.is_none());
    }

    #[test]
    fn test_default_path_is_under_app_dir() {
        let path = Settings::default_path();
        assert!(path.ends_with("filetree/settings.toml"));
        if let Some(config_dir) = dirs::config_dir() {
            assert!(path.starts_with(config_dir));
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.ui.unsaved_marker = "*".to_string();
        settings.ui.show_hidden = false;
        settings.log.file = Some(temp_dir.path().join("filetree.log"));

        settings.save(&settings_path).unwrap();

        let loaded = Settings::load(&settings_path).unwrap();
        assert_eq!(loaded.ui.unsaved_marker, "*");
        assert!(!loaded.ui.show_hidden);
        assert_eq!(loaded.log.file, settings.log.file);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("nonexistent.toml");

        let settings = Settings::load(&settings_path).unwrap();
        assert_eq!(settings.ui.tick_rate_ms, 100);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");
        std::fs::write(&settings_path, "[log]\nfilter = \"filetree=debug\"\n").unwrap();

        let settings = Settings::load(&settings_path).unwrap();
        assert_eq!(settings.log.filter, "filetree=debug");
        assert_eq!(settings.ui.unsaved_marker, "●");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");
        std::fs::write(&settings_path, "[ui]\ntick_rate_ms = \"soon\"\n").unwrap();

        let err = Settings::load(&settings_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings"));
    }

    #[test]
    fn test_settings_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir
            .path()
            .join("subdir")
            .join("nested")
            .join("settings.toml");

        assert!(!nested_path.parent().unwrap().exists());

        let settings = Settings::default();
        settings.save(&nested_path).unwrap();

        assert!(nested_path.exists());
        let content = std::fs::read_to_string(&nested_path).unwrap();
        assert!(content.contains("unsaved_marker"));
        assert!(content.contains("tick_rate_ms"));
    }
}
