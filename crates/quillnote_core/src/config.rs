//! Runtime configuration for the core.
//!
//! # Responsibility
//! - Provide defaults that work against a local Ollama install.
//! - Load an optional JSON file, then apply `QUILLNOTE_*` environment overrides.
//!
//! # Invariants
//! - Every field has a default; a missing file is not an error.
//! - Environment overrides always win over file values.

use crate::logging::LogSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ASSIST_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_ASSIST_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const ENV_ASSIST_ENDPOINT: &str = "QUILLNOTE_ASSIST_ENDPOINT";
pub const ENV_ASSIST_MODEL: &str = "QUILLNOTE_ASSIST_MODEL";
pub const ENV_DB_PATH: &str = "QUILLNOTE_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "QUILLNOTE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "QUILLNOTE_LOG_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistSettings {
    pub endpoint: String,
    pub model: String,
    pub connect_timeout_secs: u64,
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ASSIST_ENDPOINT.to_string(),
            model: DEFAULT_ASSIST_MODEL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub assist: AssistSettings,
    pub log: LogSettings,
    pub database_path: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            assist: AssistSettings::default(),
            log: LogSettings::default(),
            database_path: std::env::temp_dir().join("quillnote").join("quillnote.sqlite3"),
        }
    }
}

impl CoreConfig {
    /// Loads `path` if given (missing file falls back to defaults), then
    /// applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from `lookup`, which maps env keys to values.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(endpoint) = non_empty(ENV_ASSIST_ENDPOINT) {
            let endpoint = endpoint.trim().to_string();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: ENV_ASSIST_ENDPOINT,
                    reason: "expected an http(s) URL".to_string(),
                });
            }
            self.assist.endpoint = endpoint;
        }
        if let Some(model) = non_empty(ENV_ASSIST_MODEL) {
            self.assist.model = model.trim().to_string();
        }
        if let Some(path) = non_empty(ENV_DB_PATH) {
            self.database_path = PathBuf::from(path.trim());
        }
        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            self.log.level = level.trim().to_string();
        }
        if let Some(dir) = non_empty(ENV_LOG_DIR) {
            self.log.dir = PathBuf::from(dir.trim());
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{CoreConfig, ConfigError, DEFAULT_ASSIST_MODEL, ENV_ASSIST_ENDPOINT, ENV_ASSIST_MODEL};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn file_values_merge_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"assist":{"model":"qwen2.5:7b"},"database_path":"/data/notes.db"}"#)
            .expect("write config");

        let config = CoreConfig::from_file(&path).expect("load");
        assert_eq!(config.assist.model, "qwen2.5:7b");
        assert_eq!(config.assist.connect_timeout_secs, 10);
        assert_eq!(config.database_path, PathBuf::from("/data/notes.db"));
    }

    #[test]
    fn environment_overrides_win() {
        let config = CoreConfig::default()
            .with_overrides(lookup(&[
                (ENV_ASSIST_MODEL, "mistral"),
                (ENV_ASSIST_ENDPOINT, " "),
            ]))
            .expect("overrides");
        assert_eq!(config.assist.model, "mistral");
        assert_eq!(config.assist.endpoint, super::DEFAULT_ASSIST_ENDPOINT);
        assert_ne!(config.assist.model, DEFAULT_ASSIST_MODEL);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = CoreConfig::default()
            .with_overrides(lookup(&[(ENV_ASSIST_ENDPOINT, "ftp://host")]))
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").expect("write");
        assert!(matches!(
            CoreConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
