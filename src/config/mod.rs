//! Configuration module for specvis-rs
//!
//! A [`VisualizerConfig`] bundles the processor chain parameters, the
//! interpolation cadence, the array pool limits and the capture settings.
//!
//! # Files
//!
//! Configs are stored as TOML or JSON, picked by file extension (`.json` is
//! JSON, anything else is TOML). The default location is platform specific:
//!
//! - **Linux**: `~/.config/specvis-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/specvis-rs/config.toml`
//! - **Windows**: `%APPDATA%\specvis-rs\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use specvis_rs::config::VisualizerConfig;
//!
//! let mut config = VisualizerConfig::load_or_default(VisualizerConfig::default_path()?);
//! config.animation.interpolation_frames = 12;
//! config.save("visualizer.toml")?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, SpecVisError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "specvis-rs";

/// Default config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Current config format version
pub const CONFIG_VERSION: u32 = 1;

/// On-disk encoding of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a path's extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Get the default config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Complete visualizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub animation: AnimationConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            processing: ProcessingConfig::default(),
            animation: AnimationConfig::default(),
            pool: PoolConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl VisualizerConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        config_dir()
            .map(|dir| dir.join(CONFIG_FILE))
            .ok_or_else(|| SpecVisError::Config("Could not determine config directory".to_string()))
    }

    /// Parse a config from a string in the given format
    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: Self = match format {
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| SpecVisError::Config(format!("Failed to parse config: {}", e)))?,
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| SpecVisError::Config(format!("Failed to parse config: {}", e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config in the given format
    pub fn to_string_with_format(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| SpecVisError::Serialization(format!("Failed to serialize config: {}", e))),
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| SpecVisError::Serialization(format!("Failed to serialize config: {}", e))),
        }
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SpecVisError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::from_str_with_format(&content, ConfigFormat::from_path(path))
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpecVisError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_string_with_format(ConfigFormat::from_path(path))?;
        std::fs::write(path, content).map_err(|e| {
            SpecVisError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let processing = &self.processing;
        if processing.stride == 0 {
            return Err(SpecVisError::Config("stride must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&processing.noise_threshold_fraction) {
            return Err(SpecVisError::Config(format!(
                "noise_threshold_fraction must be within [0, 1], got {}",
                processing.noise_threshold_fraction
            )));
        }
        if !processing.db_value.is_finite() || !processing.min_db.is_finite() {
            return Err(SpecVisError::Config(
                "db_value and min_db must be finite".to_string(),
            ));
        }
        if self.animation.interpolation_frames == 0 {
            return Err(SpecVisError::Config(
                "interpolation_frames must be at least 1".to_string(),
            ));
        }
        if self.animation.max_fps == 0 {
            return Err(SpecVisError::Config("max_fps must be at least 1".to_string()));
        }
        if self.pool.shard_count == 0 {
            return Err(SpecVisError::Config(
                "shard_count must be at least 1".to_string(),
            ));
        }
        if self.capture.capture_size % 2 != 0 {
            return Err(SpecVisError::Config(format!(
                "capture_size must hold whole (real, imaginary) pairs, got {}",
                self.capture.capture_size
            )));
        }
        if self.capture.capture_rate_hz == 0 {
            return Err(SpecVisError::Config(
                "capture_rate_hz must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::stages::SmoothingWindow;

    #[test]
    fn test_default_config_is_valid() {
        assert!(VisualizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_stride() {
        let mut config = VisualizerConfig::default();
        config.processing.stride = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stride"));
    }

    #[test]
    fn test_validation_rejects_bad_fraction_and_capture_size() {
        let mut config = VisualizerConfig::default();
        config.processing.noise_threshold_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = VisualizerConfig::default();
        config.capture.capture_size = 1023;
        assert!(config.validate().is_err());

        let mut config = VisualizerConfig::default();
        config.animation.interpolation_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Toml);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let content = r#"
            [processing]
            min_db = 30.0
            smoothing_window = "window9"

            [animation]
            interpolation_frames = 10
        "#;
        let config = VisualizerConfig::from_str_with_format(content, ConfigFormat::Toml).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.processing.min_db, 30.0);
        assert_eq!(config.processing.db_value, 75.0);
        assert_eq!(config.processing.smoothing_window, SmoothingWindow::Window9);
        assert_eq!(config.animation.interpolation_frames, 10);
        assert_eq!(config.animation.max_fps, 60);
    }

    #[test]
    fn test_invalid_file_content_is_rejected() {
        let content = r#"{ "processing": { "stride": 0 } }"#;
        assert!(VisualizerConfig::from_str_with_format(content, ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VisualizerConfig::default();
        config.processing.smoothing_window = SmoothingWindow::Window5;
        config.pool.max_buffers_per_bucket = 4;

        for name in ["nested/visualizer.toml", "visualizer.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            let loaded = VisualizerConfig::load(&path).unwrap();
            assert_eq!(loaded, config);
        }
    }

    #[test]
    fn test_load_or_default_on_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert_eq!(
            VisualizerConfig::load_or_default(&missing),
            VisualizerConfig::default()
        );

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{ not json").unwrap();
        assert_eq!(
            VisualizerConfig::load_or_default(&corrupt),
            VisualizerConfig::default()
        );
    }
}
