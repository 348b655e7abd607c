//! Synchronizer configuration.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key under which bookmarks are stored locally and replicated.
pub const DEFAULT_BOOKMARKS_KEY: &str = "Bookmarks";

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyKey,
    InvalidKey(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "sync key must not be empty"),
            Self::InvalidKey(value) => write!(f, "sync key is invalid: {value}"),
        }
    }
}

impl Error for ConfigError {}

/// Settings for one synchronizer instance.
///
/// Deserializes from host settings with every field optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Store and replica key; both sides must agree on it.
    pub key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_BOOKMARKS_KEY.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if !self
            .key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ConfigError::InvalidKey(self.key.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SyncConfig, DEFAULT_BOOKMARKS_KEY};

    #[test]
    fn default_key_is_valid() {
        let config = SyncConfig::default();
        assert_eq!(config.key, DEFAULT_BOOKMARKS_KEY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_blank_and_spaced_keys() {
        assert_eq!(
            SyncConfig::with_key("").validate(),
            Err(ConfigError::EmptyKey)
        );
        assert!(matches!(
            SyncConfig::with_key("my bookmarks").validate(),
            Err(ConfigError::InvalidKey(_))
        ));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());

        let config: SyncConfig = serde_json::from_str(r#"{"key": "SXIOBookmarks"}"#).unwrap();
        assert_eq!(config.key, "SXIOBookmarks");
    }
}
