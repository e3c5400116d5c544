//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - The IANA timezone that defines "today"
//! - The signed-in viewer used by the CLI
//! - Feed paging and default filter
//! - Whether drafts are kept locally
//!
//! Configuration is stored at `~/.config/daybook/config.toml`. The daily
//! budget and timer cadences are constants and are not configurable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::limits::DEFAULT_PAGE_SIZE;
use crate::model::FeedFilter;

/// Feed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub default_filter: FeedFilter,
}

/// Draft configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/daybook/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Identity the CLI acts as.
    #[serde(default)]
    pub viewer_id: Option<String>,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub drafts: DraftsConfig,
}

fn default_timezone() -> String {
    "UTC".into()
}
fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_true() -> bool {
    true
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            default_filter: FeedFilter::default(),
        }
    }
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            viewer_id: None,
            feed: FeedConfig::default(),
            drafts: DraftsConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `~/.config/daybook[-dev]/config.toml`.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default path, writing defaults if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// # Errors
    /// Same as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| ConfigError::ParseFailed(e.to_string()).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to the default path.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// # Errors
    /// Same as [`Config::save`].
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match Self::get_json_value_by_path(&json, key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value in memory by dot-separated key. Call
    /// [`Config::save`] to persist.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value is invalid for it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = Self::normalize(key, value)?;
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, &value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn normalize(key: &str, value: &str) -> Result<String, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        match key {
            "timezone" => value
                .parse::<chrono_tz::Tz>()
                .map(|tz| tz.name().to_string())
                .map_err(|_| invalid(format!("unknown timezone '{value}'"))),
            "feed.default_filter" => value
                .parse::<FeedFilter>()
                .map(|f| f.as_str().to_string())
                .map_err(|e| invalid(e.to_string())),
            "feed.page_size" => match value.parse::<usize>() {
                Ok(0) | Err(_) => Err(invalid("page size must be a positive integer".into())),
                Ok(n) => Ok(n.to_string()),
            },
            _ => Ok(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.timezone, "UTC");
        assert_eq!(parsed.feed.page_size, 20);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("timezone = \"Europe/Oslo\"\n").unwrap();
        assert_eq!(parsed.timezone, "Europe/Oslo");
        assert_eq!(parsed.feed.default_filter, FeedFilter::Discover);
        assert!(parsed.drafts.enabled);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("feed.page_size").as_deref(), Some("20"));
        assert_eq!(cfg.get("feed.default_filter").as_deref(), Some("discover"));
        assert_eq!(cfg.get("drafts.enabled").as_deref(), Some("true"));
        assert!(cfg.get("viewer_id").is_none());
        assert!(cfg.get("feed.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("feed.page_size", "50").unwrap();
        cfg.set("drafts.enabled", "false").unwrap();
        cfg.set("feed.default_filter", "similar-goals").unwrap();
        cfg.set("viewer_id", "alice").unwrap();
        assert_eq!(cfg.feed.page_size, 50);
        assert!(!cfg.drafts.enabled);
        assert_eq!(cfg.feed.default_filter, FeedFilter::SimilarGoals);
        assert_eq!(cfg.viewer_id.as_deref(), Some("alice"));
    }

    #[test]
    fn set_validates_timezone() {
        let mut cfg = Config::default();
        cfg.set("timezone", "America/New_York").unwrap();
        assert_eq!(cfg.timezone, "America/New_York");
        let err = cfg.set("timezone", "Mars/Olympus").unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_types() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("feed.nonexistent", "1").unwrap_err(),
            CoreError::Config(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.set("drafts.enabled", "maybe").is_err());
        assert!(cfg.set("feed.page_size", "0").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg;
        changed.set("timezone", "Asia/Tokyo").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().timezone, "Asia/Tokyo");
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timezone = [").unwrap();
        assert!(matches!(
            Config::load_from(&path).unwrap_err(),
            CoreError::Config(ConfigError::ParseFailed(_))
        ));
    }
}
