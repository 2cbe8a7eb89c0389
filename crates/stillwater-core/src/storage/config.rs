//! TOML-based application configuration.
//!
//! Stores:
//! - Session timing (tick interval, pause timeout, staleness threshold)
//! - Audio preferences
//! - Manifest locations
//!
//! Configuration is stored at `~/.config/stillwater/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

/// Timing of the session loop and recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Period of the elapsed-time ticker.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// A session paused longer than this ends on its own.
    #[serde(default = "default_pause_timeout_secs")]
    pub pause_timeout_secs: u64,
    #[serde(default = "default_pause_check_interval_secs")]
    pub pause_check_interval_secs: u64,
    /// Saved sessions older than this are discarded at startup.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub keepalive: bool,
    #[serde(default = "default_narration_volume")]
    pub narration_volume: u32,
}

/// Catalog files. Unset paths fall back to the data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default)]
    pub meditation_path: Option<String>,
    #[serde(default)]
    pub stretching_path: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/stillwater/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

fn default_tick_interval_ms() -> u64 {
    100
}
fn default_pause_timeout_secs() -> u64 {
    30 * 60
}
fn default_pause_check_interval_secs() -> u64 {
    60
}
fn default_stale_after_secs() -> u64 {
    60 * 60
}
fn default_true() -> bool {
    true
}
fn default_narration_volume() -> u32 {
    80
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            pause_timeout_secs: default_pause_timeout_secs(),
            pause_check_interval_secs: default_pause_check_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            keepalive: true,
            narration_volume: default_narration_volume(),
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
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("not a leaf setting".into()));
                    }
                    _ if value.is_empty() => serde_json::Value::Null,
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Reject values the session loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.timing.tick_interval_ms == 0 {
            return Err(invalid("timing.tick_interval_ms", "must be greater than 0"));
        }
        if self.timing.pause_check_interval_secs == 0 {
            return Err(invalid(
                "timing.pause_check_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.audio.narration_volume > 100 {
            return Err(invalid("audio.narration_volume", "must be between 0 and 100"));
        }
        Ok(())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults if no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
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
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => Some(String::new()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or fails validation. The config is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// All leaf settings as `(key, value)` pairs, in file order.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                serde_json::Value::Null => out.push((prefix.to_string(), String::new())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.timing.tick_interval_ms, 100);
        assert_eq!(cfg.timing.pause_timeout_secs, 1800);
        assert_eq!(cfg.timing.pause_check_interval_secs, 60);
        assert_eq!(cfg.timing.stale_after_secs, 3600);
        assert!(cfg.audio.keepalive);
        assert_eq!(cfg.audio.narration_volume, 80);
        assert!(cfg.manifest.meditation_path.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[timing]\npause_timeout_secs = 60\n").unwrap();
        assert_eq!(cfg.timing.pause_timeout_secs, 60);
        assert_eq!(cfg.timing.tick_interval_ms, 100);
        assert_eq!(cfg.audio.narration_volume, 80);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timing.tick_interval_ms").as_deref(), Some("100"));
        assert_eq!(cfg.get("audio.keepalive").as_deref(), Some("true"));
        assert_eq!(cfg.get("manifest.meditation_path").as_deref(), Some(""));
        assert!(cfg.get("timing.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("timing.stale_after_secs", "120").unwrap();
        cfg.set("audio.keepalive", "false").unwrap();
        cfg.set("manifest.stretching_path", "/srv/stretching.json").unwrap();
        assert_eq!(cfg.timing.stale_after_secs, 120);
        assert!(!cfg.audio.keepalive);
        assert_eq!(
            cfg.manifest.stretching_path.as_deref(),
            Some("/srv/stretching.json")
        );

        cfg.set("manifest.stretching_path", "").unwrap();
        assert!(cfg.manifest.stretching_path.is_none());
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("timing.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("timing", "1"), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn set_rejects_invalid_values_without_changing_config() {
        let mut cfg = Config::default();
        assert!(cfg.set("audio.keepalive", "sometimes").is_err());
        assert!(cfg.set("timing.tick_interval_ms", "-5").is_err());
        assert!(cfg.set("timing.tick_interval_ms", "0").is_err());
        assert!(cfg.set("audio.narration_volume", "150").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn entries_lists_every_leaf() {
        let keys: Vec<String> = Config::default().entries().into_iter().map(|(k, _)| k).collect();
        assert!(keys.contains(&"timing.pause_timeout_secs".to_string()));
        assert!(keys.contains(&"audio.narration_volume".to_string()));
        assert!(keys.contains(&"manifest.meditation_path".to_string()));
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        std::fs::write(&path, "[audio]\nnarration_volume = 40\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().audio.narration_volume, 40);
    }

    #[test]
    fn load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timing = [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
