//! Feed tunables and their on-disk form

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Locale segment used in the API host (e.g. "en", "de")
    pub locale: String,
    /// API host with a `{locale}` placeholder
    pub api_host_template: String,
    /// Items requested per `more` call
    pub batch_size: usize,
    /// Pagination is triggered when fewer than this many items remain ahead
    pub low_water_mark: usize,
    /// Items this far from the current index are handed to the renderer
    pub render_distance: usize,
    /// Prefetch window behind the current index
    pub prefetch_behind: usize,
    /// Prefetch window ahead of the current index
    pub prefetch_ahead: usize,
    /// Fraction of the viewport a drag must exceed to commit
    pub gesture_threshold: f32,
    /// Delay before the single retry of a failed page fetch
    pub retry_backoff_ms: u64,
    pub max_media_per_item: usize,
    /// Media narrower than this are discarded
    pub min_media_width: u32,
    /// Random-item calls allowed per requested item before a batch gives up
    pub max_random_attempts_per_item: usize,
    /// Placeholder image URL with a `{title}` placeholder; `None` disables it
    pub placeholder_template: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            api_host_template: "https://{locale}.wikipedia.org".to_string(),
            batch_size: 5,
            low_water_mark: 3,
            render_distance: 2,
            prefetch_behind: 1,
            prefetch_ahead: 3,
            gesture_threshold: 0.15,
            retry_backoff_ms: 2000,
            max_media_per_item: 3,
            min_media_width: 300,
            max_random_attempts_per_item: 4,
            placeholder_template: Some("https://picsum.photos/seed/{title}/800/600".to_string()),
            request_timeout_ms: 10_000,
        }
    }
}

impl FeedConfig {
    /// Get the config file path (~/.config/feedswipe/config.json)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("feedswipe").join("config.json"))
    }

    /// Load config from the default path, or defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path().ok_or_else(|| {
            FeedError::ConfigError("Could not determine config directory".to_string())
        })?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            FeedError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            FeedError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| {
            FeedError::ConfigError("Could not determine config directory".to_string())
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FeedError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            FeedError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, contents).map_err(|e| {
            FeedError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.locale.trim().is_empty() {
            return Err(FeedError::ConfigError("locale must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(FeedError::ConfigError("batch_size must be at least 1".to_string()));
        }
        if !(self.gesture_threshold > 0.0 && self.gesture_threshold < 1.0) {
            return Err(FeedError::ConfigError(format!(
                "gesture_threshold must be within (0, 1), got {}",
                self.gesture_threshold
            )));
        }
        if self.max_random_attempts_per_item == 0 {
            return Err(FeedError::ConfigError(
                "max_random_attempts_per_item must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// API host for the given locale
    pub fn api_host(&self, locale: &str) -> String {
        self.api_host_template.replace("{locale}", locale)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();
        assert_eq!(config.locale, "en");
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_media_per_item, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_host_substitutes_locale() {
        let config = FeedConfig::default();
        assert_eq!(config.api_host("de"), "https://de.wikipedia.org");
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: FeedConfig = serde_json::from_str(r#"{"locale": "fr"}"#).unwrap();
        assert_eq!(config.locale, "fr");
        assert_eq!(config.low_water_mark, 3);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let config = FeedConfig {
            locale: "ja".to_string(),
            placeholder_template: None,
            ..FeedConfig::default()
        };
        config.save_to(&path).unwrap();

        let loaded = FeedConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = FeedConfig::load_from(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, FeedConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"gesture_threshold": 1.5}"#).unwrap();

        let result = FeedConfig::load_from(&path);
        assert!(matches!(result, Err(FeedError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = FeedConfig {
            batch_size: 0,
            ..FeedConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
