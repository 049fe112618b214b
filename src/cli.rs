// CLI module for argument parsing and configuration

use crate::config::FeedConfig;
use crate::error::Result;
use clap::Parser;
use std::path::PathBuf;

/// Locales the language key cycles through
pub const LANGUAGES: [&str; 6] = ["en", "de", "fr", "es", "it", "ja"];

/// Feedswipe - an endless swipeable feed of random articles in your terminal
///
/// Drag with the mouse or use j/k to move between cards, l to like.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "feedswipe")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Content language (locale segment of the API host, e.g. "en", "de")
    #[arg(short = 'l', long = "lang")]
    pub lang: Option<String>,

    /// Path to a JSON config file
    ///
    /// Defaults to the per-user config file when present.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Write logs to this file (RUST_LOG controls the level)
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Where the liked set is persisted
    #[arg(long = "liked-file")]
    pub liked_file: Option<PathBuf>,

    /// Items fetched per page
    #[arg(short = 'b', long = "batch-size")]
    pub batch_size: Option<usize>,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate the arguments and return any errors
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(lang) = &self.lang {
            if lang.is_empty() || !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(format!("Invalid language code: '{}'", lang));
            }
        }

        if self.batch_size == Some(0) {
            return Err("batch-size must be at least 1".to_string());
        }

        if let Some(path) = &self.config {
            if !path.is_file() {
                return Err(format!("Config file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Overrides config values with the flags that were given
    pub fn apply(&self, config: &mut FeedConfig) {
        if let Some(lang) = &self.lang {
            config.locale = lang.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
    }

    /// Loads the file config (explicit path or per-user default), applies
    /// flag overrides and validates the result
    pub fn load_config(&self) -> Result<FeedConfig> {
        let mut config = match &self.config {
            Some(path) => FeedConfig::load_from(path)?,
            None => FeedConfig::load()?,
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

/// The locale after `current` in [`LANGUAGES`], wrapping around.
/// Unknown locales restart the cycle.
pub fn next_language(current: &str) -> &'static str {
    match LANGUAGES.iter().position(|lang| *lang == current) {
        Some(i) => LANGUAGES[(i + 1) % LANGUAGES.len()],
        None => LANGUAGES[0],
    }
}
