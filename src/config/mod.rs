//! Application Configuration
//!
//! User settings stored in TOML format, one section per pipeline stage.
//! Every section has complete defaults so a missing file or a partial file
//! always yields a working configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::capture::CameraConstraints;
use crate::detect::DetectorConfig;
use crate::extract::ExtractorConfig;
use crate::recognize::RecognizerConfig;
use crate::rectify::RectifierConfig;
use crate::session::SessionConfig;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera stream constraints
    pub camera: CameraConstraints,
    /// Document detection settings
    pub detector: DetectorConfig,
    /// Rectification settings
    pub rectifier: RectifierConfig,
    /// Text recognition settings
    pub recognizer: RecognizerConfig,
    /// Amount extraction settings
    pub extractor: ExtractorConfig,
    /// Scan session settings
    pub session: SessionConfig,
}

/// Per-user config file location.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "ticketscan", "ticketscan")
        .context("could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load the config at `path`, writing defaults there first when the file
/// does not exist yet.
pub fn load_or_create_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let config = AppConfig::default();
        save_config(&config, path)?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(config);
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectorBackend;
    use crate::recognize::RecognizerBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Camera defaults
        assert!(config.camera.prefer_rear_facing);
        assert_eq!(config.camera.ideal_width, 1280);
        assert_eq!(config.camera.max_fps, 60);

        // Detector defaults
        assert_eq!(config.detector.backend, DetectorBackend::Edge);
        assert_eq!(config.detector.min_contour_area, 5_000.0);
        assert_eq!(config.detector.max_contour_area, 100_000.0);

        // Rectifier defaults
        assert!((config.rectifier.fill_ratio - 0.8).abs() < 0.01);
        assert!(config.rectifier.rotate_portrait);

        // Recognizer defaults
        assert_eq!(config.recognizer.backend, RecognizerBackend::Stub);
        assert_eq!(config.recognizer.language, "spa");

        // Session defaults
        assert_eq!(config.session.help_prompt_after_ms, 3_000);
        assert_eq!(config.session.detection_recency_ms, 2_000);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.camera.ideal_width, parsed.camera.ideal_width);
        assert_eq!(config.detector.backend, parsed.detector.backend);
        assert_eq!(config.recognizer.endpoint, parsed.recognizer.endpoint);
        assert_eq!(config.extractor.max_candidates, parsed.extractor.max_candidates);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[recognizer]\nbackend = \"http\"").unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.recognizer.backend, RecognizerBackend::Http);
        // Untouched sections come from defaults.
        assert_eq!(config.detector.backend, DetectorBackend::Edge);
        assert_eq!(config.camera.ideal_height, 720);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.detector.backend = DetectorBackend::Disabled;
        config.session.help_prompt_after_ms = 5_000;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.detector.backend, DetectorBackend::Disabled);
        assert_eq!(loaded.session.help_prompt_after_ms, 5_000);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_or_create_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.recognizer.backend, RecognizerBackend::Stub);

        // Second call reads the file it just wrote.
        let again = load_or_create_config(&path).unwrap();
        assert_eq!(again.camera.max_width, 1920);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
