//! Tool configuration
//!
//! Card policy limits are exposed here as named values instead of literals
//! scattered through the controller. Defaults match current Seedkeeper
//! firmware; a JSON file or environment variables can override them.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Default minimum PIN length accepted by the applet
pub const DEFAULT_MIN_PIN_LENGTH: usize = 4;
/// Default maximum PIN length accepted by the applet
pub const DEFAULT_MAX_PIN_LENGTH: usize = 16;
/// Default ceiling for an encoded secret payload
pub const DEFAULT_MAX_SECRET_SIZE: usize = 4096;
/// Secret and card labels are length-prefixed with one byte, capped at 127
pub const DEFAULT_MAX_LABEL_LENGTH: usize = 127;
/// Supported BIP39 mnemonic lengths
pub const DEFAULT_WORD_COUNTS: [usize; 2] = [12, 24];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub min_pin_length: usize,
    pub max_pin_length: usize,
    pub max_secret_size: usize,
    pub max_label_length: usize,
    pub supported_word_counts: Vec<usize>,
    /// PIN tries provisioned during card setup
    pub setup_pin_tries: u8,
    /// PUK tries provisioned during card setup
    pub setup_puk_tries: u8,
    /// Hex SHA-256 digests of trusted card certificates
    pub trusted_certificates: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_pin_length: DEFAULT_MIN_PIN_LENGTH,
            max_pin_length: DEFAULT_MAX_PIN_LENGTH,
            max_secret_size: DEFAULT_MAX_SECRET_SIZE,
            max_label_length: DEFAULT_MAX_LABEL_LENGTH,
            supported_word_counts: DEFAULT_WORD_COUNTS.to_vec(),
            setup_pin_tries: 5,
            setup_puk_tries: 5,
            trusted_certificates: Vec::new(),
        }
    }
}

/// Errors while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_usize("SEEDKEEPER_MIN_PIN_LENGTH") {
            config.min_pin_length = value;
        }
        if let Some(value) = env_usize("SEEDKEEPER_MAX_SECRET_SIZE") {
            config.max_secret_size = value;
        }
        config
    }

    pub fn is_supported_word_count(&self, count: usize) -> bool {
        self.supported_word_counts.contains(&count)
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_pin_length, 4);
        assert!(config.is_supported_word_count(12));
        assert!(config.is_supported_word_count(24));
        assert!(!config.is_supported_word_count(18));
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "max_secret_size": 512, "min_pin_length": 6 }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_secret_size, 512);
        assert_eq!(config.min_pin_length, 6);
        assert_eq!(config.max_pin_length, DEFAULT_MAX_PIN_LENGTH);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
